//! Ingestion run driver
//!
//! A run walks one source through
//! `Init -> Authenticated -> Searching -> Reconciling -> Fetching -> Merging
//! -> Publishing -> Done`. Failures of a single API call are recorded and
//! skipped; a rate limit that outlasts the retry policy ends searching (and
//! fetching) early, but whatever was gathered is still merged and
//! published. Configuration, authentication, merge and storage failures end
//! the run in `Failed` before anything further is written.

mod report;
mod state;

pub use report::{FailureReport, PublishReport, RunReport, SubQueryReport};
pub use state::RunState;

use crate::error::{ApiError, IngestError};
use crate::fetcher::{paginate, Fetcher, PageQuery};
use crate::merge::{key_set, merge, reconcile_missing};
use crate::sources::SourceAdapter;
use crate::storage::SnapshotStore;
use beatlake_common::{Batch, NaturalKey, Record, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Fields to stamp on the detail records of each discovered id
type Lineage = BTreeMap<NaturalKey, Vec<(&'static str, Value)>>;

/// A run that ended in [`RunState::Failed`]
#[derive(Error, Debug)]
#[error("{} run failed while {}: {error}", .report.source, .report.failed_in.unwrap_or(RunState::Init))]
pub struct RunFailure {
    pub report: Box<RunReport>,
    #[source]
    pub error: IngestError,
}

pub struct Pipeline<S: SourceAdapter> {
    source: S,
    fetcher: Fetcher,
    store: Arc<dyn SnapshotStore>,
    batch_pause: Duration,
}

impl<S: SourceAdapter> Pipeline<S> {
    pub fn new(source: S, fetcher: Fetcher, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            source,
            fetcher,
            store,
            batch_pause: Duration::from_millis(crate::config::DEFAULT_BATCH_PAUSE_MS),
        }
    }

    /// Pause between consecutive detail requests
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn run(&self) -> Result<RunReport, RunFailure> {
        let mut report = RunReport::new(self.source.name());
        info!(run_id = %report.run_id, "Starting ingestion run");

        match self.execute(&mut report).await {
            Ok(()) => {
                report.finish();
                info!(
                    run_id = %report.run_id,
                    searched = report.searched(),
                    discovered = report.discovered,
                    fetched = report.fetched,
                    failures = report.failures.len(),
                    rate_limited = report.rate_limited,
                    "Ingestion run complete"
                );
                Ok(report)
            },
            Err(error) => {
                report.fail();
                error!(
                    run_id = %report.run_id,
                    failed_in = ?report.failed_in,
                    error = %error,
                    "Ingestion run failed"
                );
                Err(RunFailure {
                    report: Box::new(report),
                    error,
                })
            },
        }
    }

    /// Rate-limit exhaustion or spent quota: no further calls this run
    fn halts(&self, err: &ApiError) -> bool {
        err.is_rate_limit() || self.source.is_quota_error(err)
    }

    async fn execute(&self, report: &mut RunReport) -> Result<(), IngestError> {
        // Init
        self.source.validate()?;
        let search = self.source.search_dataset();
        let detail = self.source.detail_dataset();
        if self.source.page_size() == 0 || detail.batch_size == 0 {
            return Err(crate::error::ConfigError::invalid(
                self.source.name(),
                "page size and detail batch size must be greater than 0",
            )
            .into());
        }

        report.transition(RunState::Authenticated);
        let auth = self.source.authenticate().await?;

        // Searching
        report.transition(RunState::Searching);
        let mut search_batch = Batch::new();
        let mut discovered: BTreeSet<NaturalKey> = BTreeSet::new();
        let mut lineage = Lineage::new();
        let inherited = self.source.inherited_fields();
        let mut halted = false;

        for query in self.source.sub_queries() {
            let label = query.label();
            let max_items = self.source.max_items(&query);
            let mut pager = paginate(
                &self.fetcher,
                &query,
                &auth,
                self.source.page_size(),
                max_items,
            );
            let mut retrieved = 0;
            let mut complete = true;

            loop {
                match pager.next_page().await {
                    Ok(Some(records)) => {
                        retrieved += records.len();
                        for record in records {
                            let keys = self.source.discovered_keys(&record);
                            if !inherited.is_empty() {
                                let fields: Vec<(&'static str, Value)> = inherited
                                    .iter()
                                    .filter_map(|&f| record.get(f).map(|v| (f, v.clone())))
                                    .collect();
                                for key in &keys {
                                    lineage.insert(key.clone(), fields.clone());
                                }
                            }
                            discovered.extend(keys);
                            search_batch.push(record);
                        }
                    },
                    Ok(None) => break,
                    Err(err) => {
                        complete = false;
                        report.record_failure(label.clone(), &err);
                        if self.halts(&err) {
                            halted = true;
                        }
                        break;
                    },
                }
            }

            info!(query = %label, records = retrieved, complete, "Sub-query finished");
            report.sub_queries.push(SubQueryReport {
                label,
                records: retrieved,
                complete,
            });

            if halted {
                warn!("Rate limit outlasted retries, stopping search");
                report.rate_limited = true;
                break;
            }
        }

        discovered.extend(self.source.seed_keys());
        report.discovered = discovered.len();

        // Reconciling: an id whose details came back empty has no row and
        // is requested again next run
        report.transition(RunState::Reconciling);
        let existing_details = self.store.load(detail.dataset.name).await?;
        let known = key_set(&existing_details, detail.reference_field);
        let missing = reconcile_missing(&known, &discovered);
        report.missing = missing.len();
        info!(
            discovered = discovered.len(),
            known = known.len(),
            missing = missing.len(),
            "Reconciled discovered ids against existing details"
        );

        // Fetching
        let mut detail_batch = Batch::new();
        if halted {
            warn!(skipped = missing.len(), "Skipping detail fetch after rate limit");
        } else {
            report.transition(RunState::Fetching);
            let missing: Vec<NaturalKey> = missing.into_iter().collect();

            for (index, chunk) in missing.chunks(detail.batch_size).enumerate() {
                if index > 0 && !self.batch_pause.is_zero() {
                    tokio::time::sleep(self.batch_pause).await;
                }

                let url = self.source.detail_url(chunk);
                let fetched = match self.fetcher.get(&url, &auth).await {
                    Ok(body) => self.source.parse_details(chunk, &body),
                    Err(err) => Err(err),
                };

                match fetched {
                    Ok(records) => detail_batch.extend(
                        records
                            .into_iter()
                            .map(|r| inherit(r, &lineage, detail.reference_field)),
                    ),
                    Err(err) => {
                        report.record_failure(url, &err);
                        if self.halts(&err) {
                            warn!("Rate limit outlasted retries, stopping detail fetch");
                            report.rate_limited = true;
                            break;
                        }
                    },
                }
            }
        }
        report.fetched = detail_batch.len();

        // Merging: both snapshots are built before either is written
        report.transition(RunState::Merging);
        let existing_search = self.store.load(search.name).await?;
        let merged_search = merge(&existing_search, &search_batch, search.key)?;
        let merged_details = merge(&existing_details, &detail_batch, detail.dataset.key)?;

        // Publishing
        report.transition(RunState::Publishing);
        for (name, snapshot) in [
            (search.name, &merged_search),
            (detail.dataset.name, &merged_details),
        ] {
            let outcome = self.store.save(name, snapshot).await?;
            report.published.push(PublishReport {
                dataset: name.to_string(),
                records: snapshot.len(),
                outcome,
            });
        }

        Ok(())
    }
}

fn inherit(record: Record, lineage: &Lineage, reference_field: &str) -> Record {
    let Some(fields) = record
        .natural_key(reference_field)
        .ok()
        .and_then(|key| lineage.get(&key))
    else {
        return record;
    };
    fields
        .iter()
        .fold(record, |record, (field, value)| record.with(*field, value.clone()))
}
