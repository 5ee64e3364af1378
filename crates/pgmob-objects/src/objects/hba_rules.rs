//! `pg_hba.conf` as an ordered list of rules.
//!
//! Rules compare by their whitespace-normalized text, so `host  all` and
//! `host\tall` are the same rule. The collection keeps duplicates and line
//! order. It is altered as a whole: the server file is rewritten from the
//! collection's lines.

use crate::change::ChangeRecord;
use crate::cluster::Cluster;
use crate::mapper::RowMapper;
use pgmob_core::error::Result;
use pgmob_core::ObjectKind;
use pgmob_sql::{CatalogQuery, Composable, Composed, Literal, Sql, Statement};
use std::fmt;
use std::net::IpAddr;

const MAPPER: RowMapper = RowMapper::new(ObjectKind::HbaRule, &["line"]);

/// Scratch table holding the lines while the file is rewritten.
const REWRITE_TABLE: &str = "pgmob_hba_rewrite";

/// One line of `pg_hba.conf`: a rule, a comment or a blank line.
#[derive(Debug, Clone)]
pub struct HbaRule {
    line: String,
    normalized: String,
    fields: Option<RuleFields>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RuleFields {
    kind: String,
    database: Option<String>,
    user: Option<String>,
    address: Option<String>,
    mask: Option<String>,
    auth_method: Option<String>,
    auth_options: String,
}

impl HbaRule {
    pub fn new(line: impl Into<String>) -> Self {
        let line = line.into();
        let normalized = line.split_whitespace().collect::<Vec<_>>().join(" ");
        let fields = parse(&normalized);
        Self {
            line,
            normalized,
            fields,
        }
    }

    /// The line as given.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The line with whitespace runs collapsed to single spaces.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Comments and blank lines are not rules.
    pub fn is_rule(&self) -> bool {
        self.fields.is_some()
    }

    /// Connection type: `local`, `host`, `hostssl`, ...
    pub fn kind(&self) -> Option<&str> {
        self.fields.as_ref().map(|f| f.kind.as_str())
    }

    pub fn database(&self) -> Option<&str> {
        self.fields.as_ref().and_then(|f| f.database.as_deref())
    }

    pub fn user(&self) -> Option<&str> {
        self.fields.as_ref().and_then(|f| f.user.as_deref())
    }

    pub fn address(&self) -> Option<&str> {
        self.fields.as_ref().and_then(|f| f.address.as_deref())
    }

    pub fn mask(&self) -> Option<&str> {
        self.fields.as_ref().and_then(|f| f.mask.as_deref())
    }

    pub fn auth_method(&self) -> Option<&str> {
        self.fields.as_ref().and_then(|f| f.auth_method.as_deref())
    }

    /// `name=value` options after the method, space-separated; empty if none.
    pub fn auth_options(&self) -> &str {
        self.fields.as_ref().map_or("", |f| f.auth_options.as_str())
    }
}

/// Split a normalized line into rule fields.
fn parse(normalized: &str) -> Option<RuleFields> {
    let content = normalized.split('#').next().unwrap_or_default().trim();
    if content.is_empty() {
        return None;
    }
    let mut tokens = content.split(' ').map(str::to_string);
    let mut fields = RuleFields {
        kind: tokens.next().unwrap_or_default(),
        database: tokens.next(),
        user: tokens.next(),
        ..RuleFields::default()
    };
    if fields.kind != "local" {
        fields.address = tokens.next();
        let bare_address = fields.address.as_deref().is_some_and(|a| !a.contains('/'));
        let mut rest = tokens.peekable();
        if bare_address && rest.peek().is_some_and(|t| t.parse::<IpAddr>().is_ok()) {
            fields.mask = rest.next();
        }
        fields.auth_method = rest.next();
        fields.auth_options = rest.collect::<Vec<_>>().join(" ");
    } else {
        fields.auth_method = tokens.next();
        fields.auth_options = tokens.collect::<Vec<_>>().join(" ");
    }
    Some(fields)
}

impl PartialEq for HbaRule {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for HbaRule {}

impl fmt::Display for HbaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

impl From<&str> for HbaRule {
    fn from(line: &str) -> Self {
        Self::new(line)
    }
}

impl From<String> for HbaRule {
    fn from(line: String) -> Self {
        Self::new(line)
    }
}

/// The lines of the server's `pg_hba.conf`, in file order.
#[derive(Debug, Clone, Default)]
pub struct HbaRuleCollection {
    rules: Vec<HbaRule>,
    loaded: Vec<HbaRule>,
}

impl PartialEq for HbaRuleCollection {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl HbaRuleCollection {
    /// A detached, empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(cluster: &Cluster) -> Result<Self> {
        let mut collection = Self::new();
        collection.refresh(cluster)?;
        Ok(collection)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HbaRule> {
        self.rules.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HbaRule> {
        self.rules.iter()
    }

    pub fn push(&mut self, rule: impl Into<HbaRule>) {
        self.rules.push(rule.into());
    }

    /// Insert at `index`, clamped to the end of the list.
    pub fn insert(&mut self, index: usize, rule: impl Into<HbaRule>) {
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule.into());
    }

    /// Remove the first equal rule; returns whether one was found.
    pub fn remove(&mut self, rule: impl Into<HbaRule>) -> bool {
        match self.position(rule) {
            Some(index) => {
                self.rules.remove(index);
                true
            }
            None => false,
        }
    }

    /// Index of the first equal rule.
    pub fn position(&self, rule: impl Into<HbaRule>) -> Option<usize> {
        let rule = rule.into();
        self.rules.iter().position(|r| *r == rule)
    }

    pub fn contains(&self, rule: impl Into<HbaRule>) -> bool {
        self.position(rule).is_some()
    }

    /// Whether the lines differ from the server's as of the last refresh.
    pub fn is_modified(&self) -> bool {
        self.rules != self.loaded
    }

    /// Re-read the file. Local edits are discarded.
    #[tracing::instrument(level = "debug", skip(self, cluster))]
    pub fn refresh(&mut self, cluster: &Cluster) -> Result<()> {
        let listing = Statement::new(cluster.catalog_query(CatalogQuery::HbaRules)?);
        let mut rules = Vec::new();
        for row in cluster.query(&listing)? {
            let line: Option<String> = MAPPER.map(&row)?.get("line")?;
            rules.push(HbaRule::new(line.unwrap_or_default()));
        }
        // the file's final newline yields one empty trailing line
        if rules.last().is_some_and(|r| r.line.is_empty()) {
            rules.pop();
        }
        self.loaded.clone_from(&rules);
        self.rules = rules;
        tracing::debug!(lines = self.rules.len(), "HBA rules refreshed");
        Ok(())
    }

    fn rewrite_statements(&self, hba_file: &str) -> Vec<ChangeRecord> {
        let record = |attribute, sql: Composed| {
            ChangeRecord::new("HbaRules", attribute, Statement::new(sql))
        };
        let mut records = vec![record(
            "create",
            Sql::new(format!(
                "CREATE TEMP TABLE {REWRITE_TABLE} (id int, line text) ON COMMIT DROP"
            ))
            .compose(),
        )];
        if !self.rules.is_empty() {
            let values = Sql::new(", ").join((0_i64..).zip(&self.rules).map(|(id, rule)| {
                Sql::new("(")
                    + Literal::new(id)
                    + Sql::new(", ")
                    + Literal::new(rule.normalized.as_str())
                    + Sql::new(")")
            }));
            records.push(record(
                "lines",
                Sql::new(format!("INSERT INTO {REWRITE_TABLE} (id, line) VALUES ")) + values,
            ));
        }
        records.push(record(
            "copy",
            Sql::new(format!(
                "COPY (SELECT line FROM {REWRITE_TABLE} ORDER BY id) TO "
            )) + Literal::new(hba_file),
        ));
        records
    }

    /// Rewrite the server's `pg_hba.conf` from this collection, then refresh.
    ///
    /// Lines are written whitespace-normalized. Nothing is sent when the
    /// collection is unchanged. The server does not pick up the new file
    /// until [`Cluster::reload`].
    pub fn alter(&mut self, cluster: &Cluster) -> Result<()> {
        if !self.is_modified() {
            tracing::trace!("HBA rules unchanged");
            return Ok(());
        }
        let hba_file: String = cluster.query_value(&Statement::new(Sql::new(
            "SELECT pg_catalog.current_setting('hba_file')",
        )))?;
        tracing::info!(file = %hba_file, lines = self.rules.len(), "Rewriting HBA file");
        cluster.apply(&self.rewrite_statements(&hba_file))?;
        self.refresh(cluster)
    }
}

impl Extend<HbaRule> for HbaRuleCollection {
    fn extend<I: IntoIterator<Item = HbaRule>>(&mut self, iter: I) {
        self.rules.extend(iter);
    }
}

impl<'a> IntoIterator for &'a HbaRuleCollection {
    type Item = &'a HbaRule;
    type IntoIter = std::slice::Iter<'a, HbaRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use pgmob_core::testing::{ScriptedExecutor, rows};

    fn lines(data: &[&str]) -> Vec<pgmob_core::Row> {
        rows(&["line"], data.iter().map(|l| vec![(*l).into()]).collect())
    }

    #[test]
    fn test_equality_ignores_spacing() {
        assert_eq!(HbaRule::new("host postgres"), HbaRule::new("host  postgres"));
        assert_eq!(HbaRule::new("host postgres"), HbaRule::new("host \tpostgres"));
        assert_eq!(HbaRule::new(""), HbaRule::new(" "));
        assert_ne!(HbaRule::new("host postgres"), HbaRule::new("local postgres"));
        assert_ne!(HbaRule::new("host postgres"), HbaRule::new("#host postgres"));
        assert_ne!(HbaRule::new("#comment"), HbaRule::new(""));
    }

    #[test]
    fn test_parse_local() {
        let rule = HbaRule::new("local db user1 foo a=b  c=d");
        assert_eq!(rule.kind(), Some("local"));
        assert_eq!(rule.database(), Some("db"));
        assert_eq!(rule.user(), Some("user1"));
        assert_eq!(rule.address(), None);
        assert_eq!(rule.auth_method(), Some("foo"));
        assert_eq!(rule.auth_options(), "a=b c=d");

        let rule = HbaRule::new("local db user1 foo #comment");
        assert_eq!(rule.auth_method(), Some("foo"));
        assert_eq!(rule.auth_options(), "");
    }

    #[test]
    fn test_parse_host() {
        let rule = HbaRule::new("host db user1 127.0.0.1/32 foo");
        assert_eq!(rule.address(), Some("127.0.0.1/32"));
        assert_eq!(rule.mask(), None);
        assert_eq!(rule.auth_method(), Some("foo"));
        assert_eq!(rule.auth_options(), "");

        let rule = HbaRule::new("host db user1 127.0.0.1 255.255.255.255 foo a=b");
        assert_eq!(rule.address(), Some("127.0.0.1"));
        assert_eq!(rule.mask(), Some("255.255.255.255"));
        assert_eq!(rule.auth_method(), Some("foo"));
        assert_eq!(rule.auth_options(), "a=b");

        let rule = HbaRule::new("hostssl all all db.example.com scram-sha-256");
        assert_eq!(rule.address(), Some("db.example.com"));
        assert_eq!(rule.mask(), None);
        assert_eq!(rule.auth_method(), Some("scram-sha-256"));
    }

    #[test]
    fn test_comment_is_not_a_rule() {
        let rule = HbaRule::new("#host db user1 127.0.0.1 255.255.255.255 foo a=b");
        assert!(!rule.is_rule());
        assert_eq!(rule.kind(), None);
        assert_eq!(rule.auth_method(), None);
        assert_eq!(rule.auth_options(), "");
    }

    #[test]
    fn test_list_operations() {
        let mut rules = HbaRuleCollection::new();
        rules.extend(["#hba file", "", "local all all trust"].map(HbaRule::from));
        rules.push("host all all 127.0.0.1/32 trust");
        rules.push("local all all trust");
        assert_eq!(rules.len(), 5);

        assert!(rules.contains("local   all  all    trust"));
        assert!(rules.contains(" "));
        assert!(rules.contains("host\tall\t all \t127.0.0.1/32\t\ttrust"));
        assert_eq!(rules.position("local all all trust"), Some(2));

        rules.insert(0, "# header");
        assert_eq!(rules.get(0).map(HbaRule::line), Some("# header"));
        assert!(rules.remove("local all  all trust"));
        assert_eq!(rules.position("local all all trust"), Some(4));
        assert!(!rules.remove("host replication all ::1/128 trust"));
    }

    #[test]
    fn test_load_drops_trailing_newline() {
        let exec = ScriptedExecutor::new();
        exec.respond(
            "regexp_split_to_table",
            lines(&["# TYPE DATABASE USER ADDRESS METHOD", "local all all trust", ""]),
        );
        let cluster = fixtures::cluster(&exec);
        let rules = cluster.hba_rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert!(!rules.is_modified());
        assert!(rules.get(1).unwrap().is_rule());
    }

    #[test]
    fn test_alter_rewrites_file_in_one_batch() {
        let exec = ScriptedExecutor::new();
        exec.respond("regexp_split_to_table", lines(&["local all all trust"]));
        exec.respond(
            "SELECT pg_catalog.current_setting('hba_file')",
            rows(&["hba_file"], vec![vec!["/etc/pg/pg_hba.conf".into()]]),
        );
        let cluster = fixtures::cluster(&exec);
        let mut rules = cluster.hba_rules().unwrap();

        rules.alter(&cluster).unwrap();
        assert_eq!(exec.batch_count(), 0);

        rules.push("host  all  all  10.0.0.0/8  md5");
        rules.alter(&cluster).unwrap();
        assert_eq!(exec.batch_count(), 1);
        assert_eq!(
            exec.executed_sql(),
            vec![
                "CREATE TEMP TABLE pgmob_hba_rewrite (id int, line text) ON COMMIT DROP",
                "INSERT INTO pgmob_hba_rewrite (id, line) VALUES \
                 (0, 'local all all trust'), (1, 'host all all 10.0.0.0/8 md5')",
                "COPY (SELECT line FROM pgmob_hba_rewrite ORDER BY id) TO '/etc/pg/pg_hba.conf'",
            ]
        );
        assert!(!rules.is_modified());
    }
}
