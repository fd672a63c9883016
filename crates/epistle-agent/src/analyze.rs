//! Spending analysis behind the `Analyze` intent.
//!
//! Pure store aggregation, no LLM involved. The responder phrases the
//! numbers; this module only produces them.

use std::sync::Arc;

use epistle_store::{RecordFilter, RecordStore, SpendingReport, SpendingRow};
use epistle_types::{RecordType, StructuredRecord, TimeWindow};

use crate::error::Result;

/// A spending report plus the single largest item in its window.
#[derive(Debug, Clone)]
pub struct SpendingAnalysis {
    pub report: SpendingReport,
    pub largest: Option<StructuredRecord>,
}

/// Aggregates spending over stored records.
pub struct SpendingAnalyzer {
    store: Arc<RecordStore>,
}

impl SpendingAnalyzer {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Aggregate spending, optionally restricted to one category and window.
    ///
    /// Without a category this covers the financial categories; with one it
    /// covers exactly that category, so asking about travel spending counts
    /// travel records that happen to carry amounts.
    pub fn analyze(
        &self,
        category: Option<RecordType>,
        window: Option<&TimeWindow>,
    ) -> Result<SpendingAnalysis> {
        let since = window.map(|w| w.since.date_naive());
        let until = window.map(|w| w.until.date_naive());

        let report = match category {
            None => self.store.spending_report(since, until)?,
            Some(category) => self.category_report(category, since, until)?,
        };
        let largest = self.largest_item(category, since, until)?;

        Ok(SpendingAnalysis { report, largest })
    }

    /// Single-category aggregation, folded from the record rows.
    fn category_report(
        &self,
        category: RecordType,
        since: Option<chrono::NaiveDate>,
        until: Option<chrono::NaiveDate>,
    ) -> Result<SpendingReport> {
        let records = self.list(Some(category), since, until)?;

        let mut total = 0.0;
        let mut count = 0;
        let mut by_vendor: Vec<SpendingRow> = Vec::new();

        for record in &records {
            let Some(amount) = record.amount else { continue };
            total += amount;
            count += 1;

            let key = record
                .vendor
                .clone()
                .unwrap_or_else(|| record.sender.clone());
            match by_vendor.iter_mut().find(|row| row.key == key) {
                Some(row) => {
                    row.total += amount;
                    row.count += 1;
                }
                None => by_vendor.push(SpendingRow {
                    key,
                    total: amount,
                    count: 1,
                }),
            }
        }

        by_vendor.sort_by(|a, b| {
            b.total
                .partial_cmp(&a.total)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let by_category = if count > 0 {
            vec![SpendingRow {
                key: category.as_str().to_string(),
                total,
                count,
            }]
        } else {
            Vec::new()
        };

        Ok(SpendingReport {
            since,
            until,
            total,
            record_count: count,
            by_category,
            by_vendor,
        })
    }

    /// The record with the highest amount in scope.
    fn largest_item(
        &self,
        category: Option<RecordType>,
        since: Option<chrono::NaiveDate>,
        until: Option<chrono::NaiveDate>,
    ) -> Result<Option<StructuredRecord>> {
        let records = self.list(category, since, until)?;

        Ok(records
            .into_iter()
            .filter(|r| category.is_some() || r.record_type.is_financial())
            .filter(|r| r.amount.is_some())
            .max_by(|a, b| {
                a.amount
                    .partial_cmp(&b.amount)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }))
    }

    fn list(
        &self,
        category: Option<RecordType>,
        since: Option<chrono::NaiveDate>,
        until: Option<chrono::NaiveDate>,
    ) -> Result<Vec<StructuredRecord>> {
        let mut filter = RecordFilter::default();
        if let Some(category) = category {
            filter = filter.with_record_type(category);
        }
        if let Some(since) = since {
            filter = filter.with_since(since);
        }
        if let Some(until) = until {
            filter = filter.with_until(until);
        }
        Ok(self.store.list_records(&filter)?)
    }
}
