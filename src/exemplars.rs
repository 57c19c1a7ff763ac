//! Curated few-shot exemplars per subject and the exemplar/evaluation partition.

use std::collections::{BTreeMap, HashSet};

use anyhow::{anyhow, bail};

use crate::config::SubjectSection;
use crate::record::{Dataset, StatementRecord};

/// Hand-picked exemplar ids per subject, in prompt order.
const BUILTIN_SUBJECTS: &[(&str, &str, &[&str])] = &[
    (
        "algebra",
        "algebra",
        &[
            "mathd_algebra_478",
            "mathd_algebra_141",
            "mathd_algebra_209",
            "mathd_algebra_33",
        ],
    ),
    (
        "number_theory",
        "numbertheory",
        &[
            "mathd_numbertheory_1124",
            "mathd_numbertheory_299",
            "mathd_numbertheory_229",
            "mathd_numbertheory_551",
        ],
    ),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectSpec {
    /// Substring that selects this subject's records by id.
    pub id_filter: String,
    pub exemplar_ids: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct SubjectCatalog {
    subjects: BTreeMap<String, SubjectSpec>,
}

impl SubjectCatalog {
    pub fn builtin() -> Self {
        let subjects = BUILTIN_SUBJECTS
            .iter()
            .map(|(name, filter, ids)| {
                (
                    name.to_string(),
                    SubjectSpec {
                        id_filter: filter.to_string(),
                        exemplar_ids: ids.iter().map(|s| s.to_string()).collect(),
                    },
                )
            })
            .collect();
        Self { subjects }
    }

    /// Built-in subjects, with config entries replacing or adding to them.
    pub fn from_config(sections: &BTreeMap<String, SubjectSection>) -> Self {
        let mut catalog = Self::builtin();
        for (name, section) in sections {
            let id_filter = section
                .id_filter
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(name)
                .to_string();
            catalog.subjects.insert(
                name.clone(),
                SubjectSpec {
                    id_filter,
                    exemplar_ids: section.exemplars.clone(),
                },
            );
        }
        catalog
    }

    pub fn get(&self, subject: &str) -> anyhow::Result<&SubjectSpec> {
        self.subjects.get(subject).ok_or_else(|| {
            anyhow!(
                "unknown subject: {subject} (known: {})",
                self.names().collect::<Vec<_>>().join(", ")
            )
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.subjects.keys().map(String::as_str)
    }
}

/// A subject's records split into curated exemplars and the records left to translate.
#[derive(Clone, Debug)]
pub struct SubjectSplit {
    pub subject: String,
    pub full_len: usize,
    pub exemplars: Vec<StatementRecord>,
    pub evaluation: Dataset,
}

impl SubjectSplit {
    /// Fails if a curated id does not resolve to exactly one record of the subject, or if the
    /// partition does not account for every record.
    pub fn build(dataset: &Dataset, subject: &str, spec: &SubjectSpec) -> anyhow::Result<Self> {
        let full = dataset.filter_by_substring(&spec.id_filter);

        let mut exemplars = Vec::with_capacity(spec.exemplar_ids.len());
        for id in &spec.exemplar_ids {
            let mut matches = full.iter().filter(|r| &r.id == id);
            let rec = matches
                .next()
                .ok_or_else(|| anyhow!("{subject}: exemplar {id} not found in dataset"))?;
            if matches.next().is_some() {
                bail!("{subject}: exemplar {id} matches more than one record");
            }
            exemplars.push(rec.clone());
        }

        let exemplar_ids: HashSet<&str> = spec.exemplar_ids.iter().map(String::as_str).collect();
        let evaluation = full.filter_by_ids(&exemplar_ids, false);

        if full.len() != evaluation.len() + exemplars.len() {
            bail!(
                "{subject}: partition mismatch: full={} evaluation={} exemplars={}",
                full.len(),
                evaluation.len(),
                exemplars.len()
            );
        }

        Ok(Self {
            subject: subject.to_string(),
            full_len: full.len(),
            exemplars,
            evaluation,
        })
    }
}
