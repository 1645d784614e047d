//! Species catalog loading and the work queue built from it.
//!
//! The catalog is a CSV file with one species per row. Column names are
//! matched case-insensitively and accept both the English names and the
//! Indonesian names used by the original fish lists:
//!
//! | Field | Accepted headers |
//! |---|---|
//! | regional name | `species_indonesia`, `regional_name`, `nama_umum` |
//! | scientific names | `nama_latin`, `scientific_names`, `scientific_name`, `latin` |
//! | English name | `species_english`, `english_name`, `nama_inggris` |
//! | priority | `prioritas`, `priority` |
//! | tags | `habitat`, `kategori`, `category`, `tags` |
//! | keywords | `search_keywords`, `keywords` |
//! | identifier | `id`, `no` |

mod csv;

use crate::config::SearchConfig;
use crate::error::CatalogError;
use crate::types::{Priority, SpeciesId};
use crate::utils::sanitize_species_name;
use std::path::Path;
use tracing::{info, warn};

/// One catalog entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpeciesRecord {
    /// Stable identifier
    pub id: SpeciesId,
    /// Regional (local-language) name; also names the output folder
    pub regional_name: String,
    /// Scientific names, most authoritative first
    pub scientific_names: Vec<String>,
    /// English common name
    pub english_name: Option<String>,
    /// Habitat/category tags
    pub tags: Vec<String>,
    /// Priority tier
    pub priority: Priority,
    /// Free-text search keywords
    pub keywords: Vec<String>,
}

impl SpeciesRecord {
    /// Build a record for an ad-hoc search (single species mode)
    pub fn single(name: &str, scientific_name: Option<&str>) -> Self {
        Self {
            id: SpeciesId(1),
            regional_name: name.trim().to_string(),
            scientific_names: scientific_name
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| vec![s.to_string()])
                .unwrap_or_default(),
            english_name: None,
            tags: Vec::new(),
            priority: Priority::High,
            keywords: Vec::new(),
        }
    }

    /// Whether at least one non-empty search term can be derived
    pub fn has_search_term(&self) -> bool {
        self.primary_name().is_some()
    }

    /// Name used for logs and folders: regional, else scientific, else English
    pub fn display_name(&self) -> &str {
        if !self.regional_name.trim().is_empty() {
            return self.regional_name.trim();
        }
        self.primary_name().unwrap_or("")
    }

    /// Sanitized folder/file stem for this species
    pub fn folder_name(&self) -> String {
        sanitize_species_name(self.display_name(), self.id.0)
    }

    fn primary_name(&self) -> Option<&str> {
        self.scientific_names
            .iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .or_else(|| Some(self.regional_name.trim()).filter(|s| !s.is_empty()))
            .or_else(|| {
                self.english_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            })
    }

    /// Ordered search terms, most specific first
    ///
    /// Scientific names, then scientific names with the generic qualifier,
    /// then the regional name, then the English name with the qualifier, and
    /// finally the catalog keywords. Duplicates (case-insensitive) are dropped.
    pub fn search_terms(&self, search: &SearchConfig) -> SearchTermChain {
        let mut chain = SearchTermChain::default();
        let qualifier = search.qualifier.trim();

        for name in &self.scientific_names {
            chain.push(name);
        }
        for name in &self.scientific_names {
            chain.push(&qualified(name, qualifier));
        }
        chain.push(&self.regional_name);
        if let Some(english) = &self.english_name {
            chain.push(&qualified(english, qualifier));
        }
        if search.use_keywords {
            for keyword in &self.keywords {
                chain.push(keyword);
            }
        }
        chain
    }
}

fn qualified(name: &str, qualifier: &str) -> String {
    let name = name.trim();
    if name.is_empty() || qualifier.is_empty() {
        return name.to_string();
    }
    if name.to_lowercase().contains(&qualifier.to_lowercase()) {
        name.to_string()
    } else {
        format!("{} {}", name, qualifier)
    }
}

/// Ordered, de-duplicated search strings for one species
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchTermChain {
    terms: Vec<String>,
}

impl SearchTermChain {
    fn push(&mut self, term: &str) {
        let term = term.split_whitespace().collect::<Vec<_>>().join(" ");
        if term.is_empty() {
            return;
        }
        if self.terms.iter().any(|t| t.eq_ignore_ascii_case(&term)) {
            return;
        }
        self.terms.push(term);
    }

    /// Terms in attempt order
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Number of terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether no term could be derived
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Most specific term
    pub fn first(&self) -> Option<&str> {
        self.terms.first().map(String::as_str)
    }
}

/// Priority selection for a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PriorityFilter {
    /// Every species
    #[default]
    All,
    /// Only species of the given tier
    Tier(Priority),
}

impl PriorityFilter {
    fn matches(&self, priority: Priority) -> bool {
        match self {
            PriorityFilter::All => true,
            PriorityFilter::Tier(p) => *p == priority,
        }
    }
}

/// Ordered species work queue
#[derive(Clone, Debug, Default)]
pub struct SpeciesQueue {
    records: Vec<SpeciesRecord>,
}

impl SpeciesQueue {
    /// Build a queue from records, dropping those without a derivable search term
    pub fn from_records(records: Vec<SpeciesRecord>) -> Self {
        let records = records
            .into_iter()
            .filter(|r| {
                let keep = r.has_search_term();
                if !keep {
                    warn!(species_id = r.id.0, "Skipping species with no usable search term");
                }
                keep
            })
            .collect();
        Self { records }
    }

    /// Load a catalog file, in catalog order
    ///
    /// # Errors
    ///
    /// - [`CatalogError::NotFound`] if the file does not exist
    /// - [`CatalogError::Unreadable`] if it cannot be read as UTF-8 text
    /// - [`CatalogError::MissingColumn`] if no name column is present
    /// - [`CatalogError::NoSearchTerms`] if rows exist but none is usable
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CatalogError::NotFound(path.to_path_buf()));
            }
            Err(e) => {
                return Err(CatalogError::Unreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let records = parse_catalog(path, &text)?;
        info!(
            path = %path.display(),
            species = records.len(),
            "Loaded species catalog"
        );
        Ok(Self { records })
    }

    /// Keep only species matching the filter (stable)
    pub fn filter(self, filter: PriorityFilter) -> Self {
        Self {
            records: self
                .records
                .into_iter()
                .filter(|r| filter.matches(r.priority))
                .collect(),
        }
    }

    /// Drop the first `start` entries
    pub fn skip(self, start: usize) -> Self {
        Self {
            records: self.records.into_iter().skip(start).collect(),
        }
    }

    /// Keep at most `max` entries from the front
    pub fn limit(mut self, max: usize) -> Self {
        self.records.truncate(max);
        self
    }

    /// Queued species in order
    pub fn records(&self) -> &[SpeciesRecord] {
        &self.records
    }

    /// Number of queued species
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there is no work
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IntoIterator for SpeciesQueue {
    type Item = SpeciesRecord;
    type IntoIter = std::vec::IntoIter<SpeciesRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Column positions resolved from the header row
struct Columns {
    id: Option<usize>,
    regional: Option<usize>,
    scientific: Option<usize>,
    english: Option<usize>,
    priority: Option<usize>,
    tags: Vec<usize>,
    keywords: Option<usize>,
}

impl Columns {
    fn resolve(header: &[String]) -> Self {
        let find = |aliases: &[&str]| {
            header
                .iter()
                .position(|h| aliases.iter().any(|a| h.trim().eq_ignore_ascii_case(a)))
        };
        let tags = header
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                ["habitat", "kategori", "category", "tags"]
                    .iter()
                    .any(|a| h.trim().eq_ignore_ascii_case(a))
            })
            .map(|(i, _)| i)
            .collect();

        Self {
            id: find(&["id", "no"]),
            regional: find(&["species_indonesia", "regional_name", "nama_umum"]),
            scientific: find(&["nama_latin", "scientific_names", "scientific_name", "latin"]),
            english: find(&["species_english", "english_name", "nama_inggris"]),
            priority: find(&["prioritas", "priority"]),
            tags,
            keywords: find(&["search_keywords", "keywords"]),
        }
    }
}

fn parse_catalog(path: &Path, text: &str) -> Result<Vec<SpeciesRecord>, CatalogError> {
    let mut rows = csv::parse_rows(text).into_iter();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let cols = Columns::resolve(&header);
    if cols.regional.is_none() && cols.scientific.is_none() && cols.english.is_none() {
        return Err(CatalogError::MissingColumn {
            path: path.to_path_buf(),
            column: "species_indonesia".to_string(),
        });
    }

    let mut records = Vec::new();
    let mut data_rows = 0usize;
    for (index, row) in rows.enumerate() {
        data_rows += 1;
        let row_number = (index + 1) as u32;
        let cell = |col: Option<usize>| -> &str {
            col.and_then(|c| row.get(c)).map(|s| s.trim()).unwrap_or("")
        };

        let id = cell(cols.id)
            .parse::<u32>()
            .map(SpeciesId)
            .unwrap_or(SpeciesId(row_number));

        let priority = match cell(cols.priority) {
            "" => Priority::default(),
            raw => raw.parse().unwrap_or_else(|e| {
                warn!(row = row_number, error = %e, "Unknown priority, using MEDIUM");
                Priority::default()
            }),
        };

        let english = cell(cols.english);
        let record = SpeciesRecord {
            id,
            regional_name: cell(cols.regional).to_string(),
            scientific_names: split_scientific_names(cell(cols.scientific)),
            english_name: (!english.is_empty()).then(|| english.to_string()),
            tags: cols
                .tags
                .iter()
                .flat_map(|c| split_list(cell(Some(*c))))
                .collect(),
            priority,
            keywords: split_list(cell(cols.keywords)),
        };

        if record.has_search_term() {
            records.push(record);
        } else {
            warn!(row = row_number, "Skipping catalog row with no usable search term");
        }
    }

    if data_rows > 0 && records.is_empty() {
        return Err(CatalogError::NoSearchTerms {
            path: path.to_path_buf(),
            rows: data_rows,
        });
    }
    Ok(records)
}

/// Split the scientific-name field: `" ; "` separated, else `;` or `,`
fn split_scientific_names(field: &str) -> Vec<String> {
    let parts: Vec<&str> = if field.contains(" ; ") {
        field.split(" ; ").collect()
    } else {
        field.split([';', ',']).collect()
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn split_list(field: &str) -> Vec<String> {
    field
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CATALOG: &str = "\
id,species_indonesia,nama_latin,species_english,prioritas,habitat,search_keywords
1,Kakap Merah,Lutjanus malabaricus ; Lutjanus argentimaculatus,Malabar red snapper,HIGH,laut,\"kakap merah, red snapper\"
2,Nila,Oreochromis niloticus,Nile tilapia,MEDIUM,tawar,
3,,,,LOW,,
4,Ikan Tanpa Latin,,,LOW,payau;laut,
5,Bandeng,Chanos chanos,Milkfish,HIGH,payau,bandeng
";

    fn write_catalog(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_keeps_catalog_order_and_skips_unusable_rows() {
        let (_dir, path) = write_catalog(CATALOG);
        let queue = SpeciesQueue::load(&path).unwrap();

        let ids: Vec<u32> = queue.records().iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![1, 2, 4, 5]);

        let kakap = &queue.records()[0];
        assert_eq!(kakap.regional_name, "Kakap Merah");
        assert_eq!(
            kakap.scientific_names,
            vec!["Lutjanus malabaricus", "Lutjanus argentimaculatus"]
        );
        assert_eq!(kakap.english_name.as_deref(), Some("Malabar red snapper"));
        assert_eq!(kakap.priority, Priority::High);
        assert_eq!(kakap.tags, vec!["laut"]);
        assert_eq!(kakap.keywords, vec!["kakap merah", "red snapper"]);

        assert_eq!(queue.records()[2].tags, vec!["payau", "laut"]);
    }

    #[test]
    fn test_filter_and_limit_are_stable() {
        let (_dir, path) = write_catalog(CATALOG);
        let queue = SpeciesQueue::load(&path).unwrap();

        let high = queue.clone().filter(PriorityFilter::Tier(Priority::High));
        let names: Vec<&str> = high.records().iter().map(|r| r.display_name()).collect();
        assert_eq!(names, vec!["Kakap Merah", "Bandeng"]);

        let limited = queue.clone().filter(PriorityFilter::All).limit(2);
        assert_eq!(limited.len(), 2);
        assert_eq!(limited.records()[1].display_name(), "Nila");

        let skipped = queue.skip(3);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped.records()[0].display_name(), "Bandeng");
    }

    #[test]
    fn test_missing_catalog() {
        let dir = tempdir().unwrap();
        let err = SpeciesQueue::load(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn test_header_only_catalog_is_empty_queue() {
        let (_dir, path) = write_catalog("species_indonesia,nama_latin\n");
        let queue = SpeciesQueue::load(&path).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_catalog_without_any_usable_row_is_an_error() {
        let (_dir, path) = write_catalog("species_indonesia,nama_latin,prioritas\n,,HIGH\n , ,LOW\n");
        let err = SpeciesQueue::load(&path).unwrap_err();
        assert!(matches!(err, CatalogError::NoSearchTerms { rows: 2, .. }));
    }

    #[test]
    fn test_catalog_without_name_columns_is_an_error() {
        let (_dir, path) = write_catalog("foo,bar\n1,2\n");
        let err = SpeciesQueue::load(&path).unwrap_err();
        assert!(matches!(err, CatalogError::MissingColumn { .. }));
    }

    #[test]
    fn test_unknown_priority_defaults_to_medium() {
        let (_dir, path) = write_catalog("species_indonesia,prioritas\nTongkol,URGENT\n");
        let queue = SpeciesQueue::load(&path).unwrap();
        assert_eq!(queue.records()[0].priority, Priority::Medium);
        assert_eq!(queue.records()[0].id, SpeciesId(1));
    }

    #[test]
    fn test_scientific_names_old_separators() {
        assert_eq!(
            split_scientific_names("Thunnus albacares;Thunnus obesus, Thunnus alalunga"),
            vec!["Thunnus albacares", "Thunnus obesus", "Thunnus alalunga"]
        );
        assert!(split_scientific_names("  ").is_empty());
    }

    #[test]
    fn test_search_term_chain_order() {
        let record = SpeciesRecord {
            id: SpeciesId(1),
            regional_name: "Kakap Merah".to_string(),
            scientific_names: vec!["Lutjanus malabaricus".to_string()],
            english_name: Some("Malabar red snapper".to_string()),
            tags: vec![],
            priority: Priority::High,
            keywords: vec!["kakap merah".to_string(), "snapper".to_string()],
        };

        let chain = record.search_terms(&SearchConfig::default());
        assert_eq!(
            chain.terms(),
            &[
                "Lutjanus malabaricus",
                "Lutjanus malabaricus fish",
                "Kakap Merah",
                "Malabar red snapper fish",
                "snapper",
            ]
        );
        assert_eq!(chain.first(), Some("Lutjanus malabaricus"));
    }

    #[test]
    fn test_search_term_chain_without_scientific_name() {
        let record = SpeciesRecord {
            id: SpeciesId(9),
            regional_name: "Ikan Teri".to_string(),
            scientific_names: vec![],
            english_name: Some("Anchovy fish".to_string()),
            tags: vec![],
            priority: Priority::Low,
            keywords: vec![],
        };

        let chain = record.search_terms(&SearchConfig::default());
        assert_eq!(chain.terms(), &["Ikan Teri", "Anchovy fish"]);
        assert_eq!(record.folder_name(), "ikan_teri");
    }

    #[test]
    fn test_record_without_terms_is_excluded_from_queue() {
        let empty = SpeciesRecord {
            id: SpeciesId(2),
            regional_name: "  ".to_string(),
            scientific_names: vec![" ".to_string()],
            english_name: None,
            tags: vec![],
            priority: Priority::High,
            keywords: vec!["keyword only".to_string()],
        };
        assert!(!empty.has_search_term());

        let queue = SpeciesQueue::from_records(vec![
            empty,
            SpeciesRecord::single("Tongkol", Some("Euthynnus affinis")),
        ]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.records()[0].display_name(), "Tongkol");
    }
}
