use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::Deserialize;

/// One informal/formal statement pair.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct StatementRecord {
    #[serde(alias = "name", alias = "problem_name")]
    pub id: String,
    #[serde(alias = "informal_stmt", alias = "informal")]
    pub informal_statement: String,
    #[serde(default, alias = "informal_prf")]
    pub informal_proof: Option<String>,
    #[serde(alias = "formal_stmt", alias = "formal")]
    pub formal_statement: String,
    #[serde(default, alias = "formal_prf")]
    pub formal_proof: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Dataset {
    records: Vec<StatementRecord>,
}

impl Dataset {
    pub fn new(records: Vec<StatementRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON array or a JSON Lines file of records.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read dataset: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse dataset: {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        if text.trim_start().starts_with('[') {
            let records: Vec<StatementRecord> =
                serde_json::from_str(text).context("parse json array")?;
            return Ok(Self::new(records));
        }

        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let rec: StatementRecord = serde_json::from_str(line)
                .map_err(|e| anyhow!("line {}: {e}", idx + 1))?;
            records.push(rec);
        }
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StatementRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[StatementRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&StatementRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Records whose id contains `needle`, in dataset order.
    pub fn filter_by_substring(&self, needle: &str) -> Dataset {
        Self::new(
            self.records
                .iter()
                .filter(|r| r.id.contains(needle))
                .cloned()
                .collect(),
        )
    }

    /// Records whose id is (or is not, with `keep = false`) in `ids`, in dataset order.
    pub fn filter_by_ids(&self, ids: &HashSet<&str>, keep: bool) -> Dataset {
        Self::new(
            self.records
                .iter()
                .filter(|r| ids.contains(r.id.as_str()) == keep)
                .cloned()
                .collect(),
        )
    }
}

impl std::ops::Index<usize> for Dataset {
    type Output = StatementRecord;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.records[idx]
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a StatementRecord;
    type IntoIter = std::slice::Iter<'a, StatementRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
pub(crate) fn record(id: &str, informal: &str, formal: &str) -> StatementRecord {
    StatementRecord {
        id: id.to_string(),
        informal_statement: informal.to_string(),
        informal_proof: None,
        formal_statement: formal.to_string(),
        formal_proof: None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_jsonl_with_field_aliases() {
        let text = concat!(
            r#"{"id":"mathd_algebra_1","informal_stmt":"Show 1=1.","formal_statement":"theorem a: shows \"1=1\""}"#,
            "\n\n",
            r#"{"name":"mathd_numbertheory_2","informal_statement":"Show 2=2.","informal_proof":"Trivial.","formal_stmt":"theorem b: shows \"2=2\"","formal_proof":"by simp"}"#,
            "\n",
        );
        let ds = Dataset::parse(text).expect("parse");
        assert_eq!(ds.len(), 2);
        assert_eq!(ds[0].informal_statement, "Show 1=1.");
        assert_eq!(ds[0].informal_proof, None);
        assert_eq!(ds[1].id, "mathd_numbertheory_2");
        assert_eq!(ds[1].formal_proof.as_deref(), Some("by simp"));
    }

    #[test]
    fn parses_json_array() {
        let text = r#"[{"id":"x","informal_statement":"i","formal_statement":"f"}]"#;
        let ds = Dataset::parse(text).expect("parse");
        assert_eq!(ds.get("x").map(|r| r.formal_statement.as_str()), Some("f"));
        assert!(ds.get("y").is_none());
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let text = "{\"id\":\"a\",\"informal_statement\":\"i\",\"formal_statement\":\"f\"}\n{oops}\n";
        let err = Dataset::parse(text).expect_err("should fail");
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn filters_keep_dataset_order() {
        let ds = Dataset::new(vec![
            record("mathd_algebra_3", "", ""),
            record("mathd_numbertheory_1", "", ""),
            record("mathd_algebra_1", "", ""),
        ]);
        let alg = ds.filter_by_substring("algebra");
        let ids: Vec<&str> = alg.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["mathd_algebra_3", "mathd_algebra_1"]);

        let wanted: HashSet<&str> = ["mathd_algebra_1"].into_iter().collect();
        assert_eq!(ds.filter_by_ids(&wanted, true).len(), 1);
        assert_eq!(ds.filter_by_ids(&wanted, false).len(), 2);
    }

    #[test]
    fn loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().expect("tmp");
        writeln!(
            f,
            r#"{{"id":"imo_1959_p1","informal_statement":"i","formal_statement":"f"}}"#
        )
        .expect("write");
        let ds = Dataset::load(f.path()).expect("load");
        assert_eq!(ds.len(), 1);
        assert!(!ds.is_empty());
    }
}
