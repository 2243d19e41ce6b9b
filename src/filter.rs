// District/status selection over a [`Dataset`].

use crate::dataset::Dataset;
use crate::types::{CaseStatus, NotificationRecord, RawRow};
use std::collections::BTreeSet;

/// Allowed districts and statuses. `None` means every value; an empty set
/// means nothing passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    districts: Option<BTreeSet<String>>,
    statuses: Option<BTreeSet<CaseStatus>>,
}

impl FilterSelection {
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_districts<I, S>(mut self, districts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.districts = Some(districts.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_statuses<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = CaseStatus>,
    {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    /// Removes one status from the current selection.
    #[must_use]
    pub fn without_status(self, status: CaseStatus) -> Self {
        let remaining: Vec<CaseStatus> = match &self.statuses {
            Some(set) => set.iter().copied().filter(|s| *s != status).collect(),
            None => CaseStatus::ALL.into_iter().filter(|s| *s != status).collect(),
        };
        self.with_statuses(remaining)
    }

    pub fn matches(&self, record: &NotificationRecord) -> bool {
        let district_ok = self
            .districts
            .as_ref()
            .map_or(true, |set| set.contains(&record.district_name));
        let status_ok = self
            .statuses
            .as_ref()
            .map_or(true, |set| set.contains(&record.case_status));
        district_ok && status_ok
    }
}

pub fn apply<'a>(dataset: &'a Dataset, selection: &FilterSelection) -> FilteredView<'a> {
    FilteredView {
        dataset,
        selection: selection.clone(),
    }
}

/// Records of a dataset that pass a selection. Nothing is copied; every
/// traversal re-evaluates the selection.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    dataset: &'a Dataset,
    selection: FilterSelection,
}

impl<'a> FilteredView<'a> {
    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a NotificationRecord> + '_ {
        self.dataset
            .records()
            .iter()
            .filter(move |r| self.selection.matches(r))
    }

    /// Matching records paired with the source rows they came from.
    pub fn entries(&self) -> impl Iterator<Item = (&'a RawRow, &'a NotificationRecord)> + '_ {
        self.dataset
            .rows()
            .iter()
            .zip(self.dataset.records())
            .filter(move |(_, r)| self.selection.matches(r))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}
