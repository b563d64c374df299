//! Permission-filtered pagination over a streamed record collection.
//!
//! `skip` and `limit` count *permitted* records only: a caller paging through
//! their visible set never sees gaps or duplicates caused by records they
//! cannot see. Records are read in keyset batches ordered newest first with
//! ties broken by id, so memory use is bounded by the batch size.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::access::record_permitted;
use crate::error::GradingError;
use crate::model::{Assignment, Permission, Record, SortKey, Submission};
use crate::store::RecordStore;

/// Default number of records fetched per batch.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// A collection that can be read in listing order, one batch at a time.
#[async_trait]
pub trait RecordSource<R: Record>: Send + Sync {
    /// Up to `size` records strictly after `after` in listing order.
    async fn fetch_batch(&self, after: Option<&SortKey>, size: usize)
        -> Result<Vec<R>, GradingError>;
}

/// All assignments in a store.
pub struct AssignmentSource<'a>(pub &'a dyn RecordStore);

#[async_trait]
impl RecordSource<Assignment> for AssignmentSource<'_> {
    async fn fetch_batch(
        &self,
        after: Option<&SortKey>,
        size: usize,
    ) -> Result<Vec<Assignment>, GradingError> {
        self.0.assignment_batch(after, size).await
    }
}

/// Submissions of one assignment.
pub struct SubmissionSource<'a> {
    pub store: &'a dyn RecordStore,
    pub assignment_id: &'a str,
}

#[async_trait]
impl RecordSource<Submission> for SubmissionSource<'_> {
    async fn fetch_batch(
        &self,
        after: Option<&SortKey>,
        size: usize,
    ) -> Result<Vec<Submission>, GradingError> {
        self.store
            .submission_batch(self.assignment_id, after, size)
            .await
    }
}

/// Submissions made by one student, across assignments.
pub struct StudentSubmissionSource<'a> {
    pub store: &'a dyn RecordStore,
    pub student_id: &'a str,
}

#[async_trait]
impl RecordSource<Submission> for StudentSubmissionSource<'_> {
    async fn fetch_batch(
        &self,
        after: Option<&SortKey>,
        size: usize,
    ) -> Result<Vec<Submission>, GradingError> {
        self.store
            .student_submission_batch(self.student_id, after, size)
            .await
    }
}

/// Who is listing, and what they need to be allowed to do.
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub principal_id: &'a str,
    pub permission: Permission,
    pub group_ids: &'a HashSet<String>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// Counters from one scan, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub batches: usize,
    pub scanned: usize,
    pub denied: usize,
    pub skipped: usize,
}

/// Streams a collection and returns a stable page of permitted records.
#[derive(Debug, Clone, Copy)]
pub struct PermissionedPaginator {
    batch_size: usize,
}

impl Default for PermissionedPaginator {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl PermissionedPaginator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Return the page of permitted records described by `request`.
    pub async fn list<R, S>(
        &self,
        source: &S,
        request: &PageRequest<'_>,
    ) -> Result<Vec<R>, GradingError>
    where
        R: Record,
        S: RecordSource<R> + ?Sized,
    {
        self.list_with_stats(source, request)
            .await
            .map(|(page, _)| page)
    }

    /// Like [`list`](Self::list), also returning scan counters.
    pub async fn list_with_stats<R, S>(
        &self,
        source: &S,
        request: &PageRequest<'_>,
    ) -> Result<(Vec<R>, ScanStats), GradingError>
    where
        R: Record,
        S: RecordSource<R> + ?Sized,
    {
        let (page, stats) = self
            .scan(source, request.skip, request.limit, |record: &R| {
                record_permitted(
                    record,
                    request.principal_id,
                    request.permission,
                    request.group_ids,
                )
            })
            .await?;

        tracing::debug!(
            principal = request.principal_id,
            permission = %request.permission,
            batches = stats.batches,
            scanned = stats.scanned,
            denied = stats.denied,
            returned = page.len(),
            "permissioned listing"
        );
        Ok((page, stats))
    }

    /// Page through every record of `source`. For collections the caller
    /// has already authorized as a whole, such as a grader's view of an
    /// assignment's submissions.
    pub async fn list_all<R, S>(
        &self,
        source: &S,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<R>, GradingError>
    where
        R: Record,
        S: RecordSource<R> + ?Sized,
    {
        let (page, stats) = self.scan(source, skip, limit, |_: &R| true).await?;
        tracing::debug!(
            batches = stats.batches,
            scanned = stats.scanned,
            returned = page.len(),
            "unfiltered listing"
        );
        Ok(page)
    }

    async fn scan<R, S, F>(
        &self,
        source: &S,
        skip: usize,
        limit: Option<usize>,
        permitted: F,
    ) -> Result<(Vec<R>, ScanStats), GradingError>
    where
        R: Record,
        S: RecordSource<R> + ?Sized,
        F: Fn(&R) -> bool + Sync,
    {
        let mut page = Vec::new();
        let mut stats = ScanStats::default();
        if limit == Some(0) {
            return Ok((page, stats));
        }

        let mut cursor: Option<SortKey> = None;
        'scan: loop {
            let batch = source.fetch_batch(cursor.as_ref(), self.batch_size).await?;
            stats.batches += 1;
            let exhausted = batch.len() < self.batch_size;
            cursor = batch.last().map(Record::sort_key);

            for record in batch {
                stats.scanned += 1;
                if !permitted(&record) {
                    stats.denied += 1;
                    continue;
                }
                if stats.skipped < skip {
                    stats.skipped += 1;
                    continue;
                }
                page.push(record);
                if limit.is_some_and(|limit| page.len() >= limit) {
                    break 'scan;
                }
            }

            if exhausted || cursor.is_none() {
                break;
            }
        }
        Ok((page, stats))
    }
}
