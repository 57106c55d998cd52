// src/core/catalog.rs

// The pattern catalog: every URL the scanner knows how to probe, grouped by
// category, plus the rule that classifies each category's responses.
// Adding a category means adding a table here and an entry in `RULES`.

use std::collections::BTreeMap;

use crate::core::error::ScanError;
use crate::core::models::{Category, Target};
use crate::core::scanner::probe::{
    classify_header, classify_status, record_found, record_found_or_missing, Classifier,
    FindingRule,
};

/// A template for one probe URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub category: Category,
    /// Header name for header checks, a short description otherwise.
    pub name: String,
    /// URL with a `{target}` placeholder.
    pub template: String,
}

impl Pattern {
    pub fn new(category: Category, name: &str, template: &str) -> Self {
        Self { category, name: name.to_string(), template: template.to_string() }
    }

    pub fn url(&self, target: &Target) -> String {
        self.template.replace("{target}", target.as_str())
    }
}

/// How responses for a category are classified and which outcomes are kept.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub classify: Classifier,
    pub record: FindingRule,
}

/// Classification table, one row per category.
static RULES: &[(Category, CategoryRule)] = &[
    (Category::ApiEndpoints, CategoryRule { classify: classify_status, record: record_found }),
    (Category::SecurityHeaders, CategoryRule { classify: classify_header, record: record_found_or_missing }),
    (Category::CloudResources, CategoryRule { classify: classify_status, record: record_found }),
    (Category::ContentDiscovery, CategoryRule { classify: classify_status, record: record_found }),
];

const API_ENDPOINTS: &[(&str, &str)] = &[
    ("API root", "https://{target}/api/"),
    ("API v1", "https://{target}/v1/"),
    ("API v2", "https://{target}/v2/"),
    ("Swagger UI", "https://{target}/swagger/"),
    ("GraphQL", "https://{target}/graphql"),
];

// Checked in this order; the order is also the export order.
const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("Strict-Transport-Security", "https://{target}"),
    ("Content-Security-Policy", "https://{target}"),
    ("X-Frame-Options", "https://{target}"),
    ("X-Content-Type-Options", "https://{target}"),
    ("X-XSS-Protection", "https://{target}"),
];

const CLOUD_RESOURCES: &[(&str, &str)] = &[
    ("AWS S3 bucket", "https://{target}.s3.amazonaws.com"),
    ("Azure blob container", "https://{target}.blob.core.windows.net"),
    ("GCP storage bucket", "https://storage.googleapis.com/{target}"),
    ("DigitalOcean Space", "https://{target}.digitaloceanspaces.com"),
];

const CONTENT_DISCOVERY: &[(&str, &str)] = &[
    ("Admin directory", "https://{target}/admin/"),
    ("Backup directory", "https://{target}/backup/"),
    ("Git metadata", "https://{target}/.git/HEAD"),
    ("Environment file", "https://{target}/.env"),
    ("Backup archive", "https://{target}/backup.zip"),
    ("Config backup", "https://{target}/config.php.bak"),
    ("IIS configuration", "https://{target}/web.config"),
    ("DS_Store file", "https://{target}/.DS_Store"),
    ("Apache status page", "https://{target}/server-status"),
];

fn builtin_table(category: Category) -> &'static [(&'static str, &'static str)] {
    match category {
        Category::ApiEndpoints => API_ENDPOINTS,
        Category::SecurityHeaders => SECURITY_HEADERS,
        Category::CloudResources => CLOUD_RESOURCES,
        Category::ContentDiscovery => CONTENT_DISCOVERY,
    }
}

fn default_rule(category: Category) -> Option<CategoryRule> {
    RULES.iter().find(|(c, _)| *c == category).map(|(_, rule)| *rule)
}

/// One category's patterns and classification rule.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub rule: CategoryRule,
    pub patterns: Vec<Pattern>,
}

/// An immutable set of patterns, grouped by category in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<Category, CatalogEntry>,
}

impl Catalog {
    /// The catalog shipped with the scanner.
    pub fn builtin() -> Self {
        let patterns = Category::all()
            .into_iter()
            .flat_map(|category| {
                builtin_table(category)
                    .iter()
                    .map(move |(name, template)| Pattern::new(category, name, template))
            })
            .collect();
        Self::from_patterns(patterns)
    }

    /// Builds a catalog from an explicit pattern list, keeping the given order
    /// within each category. Categories without a classification rule are skipped.
    pub fn from_patterns(patterns: Vec<Pattern>) -> Self {
        let mut entries: BTreeMap<Category, CatalogEntry> = BTreeMap::new();
        for pattern in patterns {
            let Some(rule) = default_rule(pattern.category) else {
                continue;
            };
            entries
                .entry(pattern.category)
                .or_insert_with(|| CatalogEntry { rule, patterns: Vec::new() })
                .patterns
                .push(pattern);
        }
        Self { entries }
    }

    pub fn categories(&self) -> Vec<Category> {
        self.entries.keys().copied().collect()
    }

    pub fn entry(&self, category: Category) -> Result<&CatalogEntry, ScanError> {
        self.entries
            .get(&category)
            .ok_or_else(|| ScanError::UnknownCategory(category.to_string()))
    }

    pub fn patterns_for(&self, category: Category) -> Result<&[Pattern], ScanError> {
        self.entry(category).map(|e| e.patterns.as_slice())
    }

    pub fn rule_for(&self, category: Category) -> Result<CategoryRule, ScanError> {
        self.entry(category).map(|e| e.rule)
    }
}
