//! Grouping an unordered batch of scanned pages by document and page number.

use std::collections::BTreeMap;

use crate::scanner::{PageScan, ScanResult};

/// A successfully scanned page and where it came from in the batch.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrganizedPage {
    /// Position of the source photograph in the input batch.
    pub image_index: usize,
    pub scan: PageScan,
}

/// A second image resolving to an already filled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DuplicatePage {
    pub document_id: usize,
    pub page_number: usize,
    pub kept_image_index: usize,
    pub discarded_image_index: usize,
}

/// Per-document page listing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DocumentSummary {
    pub document_id: usize,
    pub pages: Vec<usize>,
    /// Page numbers below the highest one seen that no image resolved to.
    pub missing_pages: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BatchSummary {
    pub total_scanned: usize,
    pub total_organized: usize,
    pub total_failed: usize,
    pub duplicate_count: usize,
    pub documents: Vec<DocumentSummary>,
}

/// Immutable result of organizing one batch.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrganizedBatch {
    documents: BTreeMap<usize, BTreeMap<usize, OrganizedPage>>,
    duplicates: Vec<DuplicatePage>,
    failed_image_indices: Vec<usize>,
    total_scanned: usize,
}

impl OrganizedBatch {
    /// Document ids in ascending order.
    pub fn document_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.documents.keys().copied()
    }

    /// Pages of `document_id` in page order. Empty for unknown documents.
    pub fn pages(&self, document_id: usize) -> impl Iterator<Item = &OrganizedPage> + '_ {
        self.documents
            .get(&document_id)
            .into_iter()
            .flat_map(|pages| pages.values())
    }

    pub fn page(&self, document_id: usize, page_number: usize) -> Option<&OrganizedPage> {
        self.documents.get(&document_id)?.get(&page_number)
    }

    pub fn documents(&self) -> &BTreeMap<usize, BTreeMap<usize, OrganizedPage>> {
        &self.documents
    }

    pub fn duplicates(&self) -> &[DuplicatePage] {
        &self.duplicates
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }

    /// Input positions of images whose scan failed.
    pub fn failed_image_indices(&self) -> &[usize] {
        &self.failed_image_indices
    }

    pub fn failed_count(&self) -> usize {
        self.failed_image_indices.len()
    }

    pub fn total_scanned(&self) -> usize {
        self.total_scanned
    }

    pub fn organized_count(&self) -> usize {
        self.documents.values().map(BTreeMap::len).sum()
    }

    pub fn summary(&self) -> BatchSummary {
        let documents = self
            .documents
            .iter()
            .map(|(&document_id, pages)| {
                let present: Vec<usize> = pages.keys().copied().collect();
                let highest = present.last().copied().unwrap_or(0);
                let missing_pages = (0..highest).filter(|p| !pages.contains_key(p)).collect();
                DocumentSummary {
                    document_id,
                    pages: present,
                    missing_pages,
                }
            })
            .collect();
        BatchSummary {
            total_scanned: self.total_scanned,
            total_organized: self.organized_count(),
            total_failed: self.failed_count(),
            duplicate_count: self.duplicate_count(),
            documents,
        }
    }
}

/// Reduces a completed batch of scan results into an [`OrganizedBatch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmissionOrganizer;

impl SubmissionOrganizer {
    pub fn new() -> Self {
        Self
    }

    /// Group `results` (in input order) by document and page.
    ///
    /// The first image resolving to a slot wins; later ones are recorded as
    /// [`DuplicatePage`]s. Failed scans are counted but never attributed to a
    /// document.
    pub fn organize<I>(&self, results: I) -> OrganizedBatch
    where
        I: IntoIterator<Item = ScanResult>,
    {
        let mut batch = OrganizedBatch::default();
        for (image_index, result) in results.into_iter().enumerate() {
            batch.total_scanned += 1;
            let scan = match result {
                ScanResult::Success(scan) => scan,
                ScanResult::Failure(failure) => {
                    tracing::debug!("image {} not organized: {}", image_index, failure.reason);
                    batch.failed_image_indices.push(image_index);
                    continue;
                }
            };

            let (document_id, page_number) = (scan.document_id, scan.page_number);
            let pages = batch.documents.entry(document_id).or_default();
            if let Some(kept) = pages.get(&page_number) {
                tracing::warn!(
                    "duplicate page {} for document {}: keeping image {}, discarding image {}",
                    page_number,
                    document_id,
                    kept.image_index,
                    image_index
                );
                batch.duplicates.push(DuplicatePage {
                    document_id,
                    page_number,
                    kept_image_index: kept.image_index,
                    discarded_image_index: image_index,
                });
                continue;
            }
            pages.insert(page_number, OrganizedPage { image_index, scan });
        }

        tracing::info!(
            "organized {} of {} images into {} documents ({} failed, {} duplicates)",
            batch.organized_count(),
            batch.total_scanned,
            batch.documents.len(),
            batch.failed_count(),
            batch.duplicate_count()
        );
        batch
    }
}
