//! Amendment documents: rows compared across two dataset versions.

use crate::error::{AssembleError, ParseError};
use crate::parser::{RecordAssembler, WireParser};
use collecta_protocol::wire::{AMENDMENT_TYPE_TAG, NULLIFIED_TAG, ROW_ID_TAG, VERSION_TAG};
use collecta_protocol::{version_suffix, AmendmentType};
use quick_xml::escape::escape;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use tracing::{debug, info_span};

/// One raw `<tag>text</tag>` field of a `result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub tag: String,
    pub text: String,
}

impl Fragment {
    /// Serialized form, text escaped.
    pub fn render(&self) -> String {
        format!("<{tag}>{}</{tag}>", escape(self.text.as_str()), tag = self.tag)
    }

    /// Bookkeeping fields that do not count as a change.
    fn is_bookkeeping(&self) -> bool {
        self.tag == VERSION_TAG || self.tag == AMENDMENT_TYPE_TAG
    }
}

/// A row of an amendment document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetComparison {
    pub row_id: Option<String>,
    pub nullified: bool,
    /// `None` means unchanged or not stated
    pub amendment: Option<AmendmentType>,
    pub fragments: Vec<Fragment>,
    /// Two-digit suffix of the dataset version, e.g. `03`
    pub version: Option<String>,
}

impl DatasetComparison {
    pub fn fragment(&self, tag: &str) -> Option<&str> {
        self.fragments
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.text.as_str())
    }

    fn same_content(&self, other: &DatasetComparison) -> bool {
        let content = |c: &DatasetComparison| -> Vec<Fragment> {
            c.fragments
                .iter()
                .filter(|f| !f.is_bookkeeping())
                .cloned()
                .collect()
        };
        self.nullified == other.nullified && content(self) == content(other)
    }
}

fn parse_flag(tag: &str, text: &str) -> Result<bool, AssembleError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "n" | "no" => Ok(false),
        "1" | "true" | "y" | "yes" => Ok(true),
        _ => Err(AssembleError::InvalidValue {
            tag: tag.to_string(),
            value: text.to_string(),
        }),
    }
}

/// Assembles `result` elements into [`DatasetComparison`]s.
#[derive(Debug, Default)]
pub struct ComparisonAssembler {
    current: DatasetComparison,
}

impl RecordAssembler for ComparisonAssembler {
    type Record = DatasetComparison;

    fn begin_record(&mut self) {
        self.current = DatasetComparison::default();
    }

    fn field(&mut self, tag: &str, text: &str) -> Result<(), AssembleError> {
        match tag {
            ROW_ID_TAG => {
                let id = text.trim();
                self.current.row_id = (!id.is_empty()).then(|| id.to_string());
            }
            NULLIFIED_TAG => self.current.nullified = parse_flag(tag, text)?,
            AMENDMENT_TYPE_TAG => self.current.amendment = AmendmentType::from_code(text)?,
            VERSION_TAG => self.current.version = version_suffix(text),
            _ => {}
        }
        self.current.fragments.push(Fragment {
            tag: tag.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn finish_record(&mut self) -> Result<DatasetComparison, AssembleError> {
        Ok(std::mem::take(&mut self.current))
    }
}

/// Parser producing [`DatasetComparison`]s.
pub fn comparison_parser<R: BufRead>(input: R) -> WireParser<R, ComparisonAssembler> {
    WireParser::new(input, ComparisonAssembler::default())
}

/// Diffs two dataset documents by row id.
pub struct DatasetComparator;

impl DatasetComparator {
    /// Rows added, deleted or modified between `old` and `new`.
    ///
    /// Added and modified rows come in `new` document order, followed by
    /// deleted rows in `old` document order. Unchanged rows are omitted.
    pub fn diff<A: BufRead, B: BufRead>(old: A, new: B) -> Result<Vec<DatasetComparison>, ParseError> {
        let span = info_span!("compare");
        let _enter = span.enter();

        let old_rows = collect_by_id(comparison_parser(old))?;
        let new_rows = collect_by_id(comparison_parser(new))?;

        let old_index: HashMap<&str, &DatasetComparison> =
            old_rows.iter().map(|(id, row)| (id.as_str(), row)).collect();
        let new_ids: HashSet<&str> = new_rows.iter().map(|(id, _)| id.as_str()).collect();

        let mut amendments = Vec::new();
        for (id, row) in &new_rows {
            let amendment = match old_index.get(id.as_str()) {
                None => AmendmentType::Added,
                Some(previous) if !previous.same_content(row) => AmendmentType::Modified,
                Some(_) => continue,
            };
            amendments.push(DatasetComparison {
                amendment: Some(amendment),
                ..row.clone()
            });
        }
        for (id, row) in &old_rows {
            if !new_ids.contains(id.as_str()) {
                amendments.push(DatasetComparison {
                    amendment: Some(AmendmentType::Deleted),
                    ..row.clone()
                });
            }
        }

        debug!(
            old = old_rows.len(),
            new = new_rows.len(),
            amendments = amendments.len(),
            "Datasets compared"
        );
        Ok(amendments)
    }
}

fn collect_by_id<R: BufRead>(
    mut parser: WireParser<R, ComparisonAssembler>,
) -> Result<Vec<(String, DatasetComparison)>, ParseError> {
    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    while let Some(row) = parser.next_record()? {
        let position = parser.byte_position();
        let id = row
            .row_id
            .clone()
            .ok_or(ParseError::MissingRowId { position })?;
        if !seen.insert(id.clone()) {
            return Err(ParseError::DuplicateRowId { row_id: id, position });
        }
        rows.push((id, row));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(results: &str) -> String {
        format!(
            "<message><header><senderId>X</senderId></header><payload>\
             <operation><opType>Replace</opType></operation>\
             <dataset>{}</dataset></payload></message>",
            results
        )
    }

    #[test]
    fn test_amendment_fields() {
        let xml = doc(
            "<result><recordId>7</recordId><nullified>Y</nullified><amType>M</amType>\
             <datasetVersion>IT-2024-0042.03</datasetVersion><resVal>1.5</resVal></result>",
        );
        let rows: Vec<_> = comparison_parser(xml.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.row_id.as_deref(), Some("7"));
        assert!(row.nullified);
        assert_eq!(row.amendment, Some(AmendmentType::Modified));
        assert_eq!(row.version.as_deref(), Some("03"));
        assert_eq!(row.fragments.len(), 5);
        assert_eq!(row.fragments[4].render(), "<resVal>1.5</resVal>");
    }

    #[test]
    fn test_empty_amendment_is_unchanged() {
        let xml = doc("<result><recordId>7</recordId><amType/></result>");
        let row = comparison_parser(xml.as_bytes()).next().unwrap().unwrap();
        assert_eq!(row.amendment, None);
        assert_eq!(row.version, None);
    }

    #[test]
    fn test_unknown_amendment_code() {
        let xml = doc("<result><recordId>7</recordId><amType>X</amType></result>");
        let err = comparison_parser(xml.as_bytes()).next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            ParseError::Record {
                source: AssembleError::Vocabulary(_),
                ..
            }
        ));
    }

    #[test]
    fn test_fragment_escaping() {
        let fragment = Fragment {
            tag: "resComm".to_string(),
            text: "a < b & c".to_string(),
        };
        assert_eq!(fragment.render(), "<resComm>a &lt; b &amp; c</resComm>");
    }

    #[test]
    fn test_diff() {
        let old = doc(
            "<result><recordId>1</recordId><v>a</v><datasetVersion>D.01</datasetVersion></result>\
             <result><recordId>2</recordId><v>b</v></result>\
             <result><recordId>3</recordId><v>c</v></result>",
        );
        let new = doc(
            "<result><recordId>1</recordId><v>a</v><datasetVersion>D.02</datasetVersion></result>\
             <result><recordId>2</recordId><v>B</v></result>\
             <result><recordId>4</recordId><v>d</v></result>",
        );
        let diff = DatasetComparator::diff(old.as_bytes(), new.as_bytes()).unwrap();
        let summary: Vec<_> = diff
            .iter()
            .map(|c| (c.row_id.clone().unwrap(), c.amendment.unwrap()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("2".to_string(), AmendmentType::Modified),
                ("4".to_string(), AmendmentType::Added),
                ("3".to_string(), AmendmentType::Deleted),
            ]
        );
        assert_eq!(diff[0].fragment("v"), Some("B"));
        assert_eq!(diff[2].fragment("v"), Some("c"));
    }

    #[test]
    fn test_diff_requires_row_ids() {
        let old = doc("<result><v>a</v></result>");
        let new = doc("");
        let err = DatasetComparator::diff(old.as_bytes(), new.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::MissingRowId { .. }));
    }

    #[test]
    fn test_diff_rejects_repeated_row_id() {
        let twice = doc(
            "<result><recordId>1</recordId><v>a</v></result>\
             <result><recordId>1</recordId><v>b</v></result>",
        );
        let once = doc("<result><recordId>1</recordId><v>a</v></result>");

        for (old, new) in [(&twice, &once), (&once, &twice)] {
            let err = DatasetComparator::diff(old.as_bytes(), new.as_bytes()).unwrap_err();
            assert!(matches!(
                err,
                ParseError::DuplicateRowId { ref row_id, .. } if row_id == "1"
            ));
        }
    }
}
