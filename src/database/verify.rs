//! Read-only schema verification
//!
//! Probes a live database for the properties the declared indexes exist to
//! provide: uniqueness of user emails and usernames, index-backed lookup of
//! stories by owner, reverse-chronological ordering without an in-memory
//! sort, and a working full-text search over story titles and themes.
//!
//! Plans are read through `explain` with `queryPlanner` verbosity. Only the
//! text probe executes its query, capped at five results. Nothing is written.

use crate::database::core::{
    codes, DatabaseConn, ExistingIndex, IndexKind, SchemaBackend, SchemaDefinitions, SchemaError,
};
use crate::database::records::fields;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use serde::Serialize;
use tracing::debug;

/// Value no real story owner uses
const PROBE_USER_ID: &str = "__filmdb_probe__";

/// Search term for the text probe
const PROBE_TEXT: &str = "story";

/// Stages and indexes of a winning query plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPlan {
    pub stages: Vec<String>,
    pub index_names: Vec<String>,
}

impl QueryPlan {
    /// Read the winning plan out of an `explain` reply
    ///
    /// Handles classic plans (`inputStage` / `inputStages`), slot-based plans
    /// (`winningPlan.queryPlan`) and sharded replies (`winningPlan.shards`).
    pub fn from_explain(explain: &Document) -> Option<Self> {
        let planner = explain.get_document("queryPlanner").ok()?;
        let winning = planner.get_document("winningPlan").ok()?;

        let mut plan = QueryPlan::default();
        plan.walk_winning(winning);
        Some(plan)
    }

    fn walk_winning(&mut self, winning: &Document) {
        if let Ok(shards) = winning.get_array("shards") {
            for shard in shards {
                if let Some(inner) = shard
                    .as_document()
                    .and_then(|s| s.get_document("winningPlan").ok())
                {
                    self.walk_winning(inner);
                }
            }
            return;
        }

        let root = winning.get_document("queryPlan").unwrap_or(winning);
        self.walk(root);
    }

    fn walk(&mut self, stage: &Document) {
        if let Ok(name) = stage.get_str("stage") {
            self.stages.push(name.to_string());
        }
        if let Ok(index) = stage.get_str("indexName") {
            self.index_names.push(index.to_string());
        }
        if let Ok(input) = stage.get_document("inputStage") {
            self.walk(input);
        }
        if let Ok(inputs) = stage.get_array("inputStages") {
            for input in inputs.iter().filter_map(Bson::as_document) {
                self.walk(input);
            }
        }
    }

    pub fn has_stage(&self, name: &str) -> bool {
        self.stages.iter().any(|stage| stage == name)
    }

    pub fn uses_index(&self, name: &str) -> bool {
        self.index_names.iter().any(|index| index == name)
    }

    fn describe(&self) -> String {
        self.stages.join(" <- ")
    }
}

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct ProbeResult {
    pub probe: String,
    pub passed: bool,
    pub detail: String,
}

impl ProbeResult {
    fn pass(probe: &str, detail: impl Into<String>) -> Self {
        Self {
            probe: probe.to_string(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(probe: &str, detail: impl Into<String>) -> Self {
        Self {
            probe: probe.to_string(),
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Results of all probes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub database: String,
    pub probes: Vec<ProbeResult>,
}

impl VerifyReport {
    pub fn all_passed(&self) -> bool {
        self.probes.iter().all(|probe| probe.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.probes.iter().filter(|probe| !probe.passed).count()
    }
}

/// Check that a unique single-field ascending index covers `field`
pub fn check_unique(indexes: &[ExistingIndex], collection: &str, field: &str) -> ProbeResult {
    let probe = format!("{}.{} unique", collection, field);
    let keys = vec![(field.to_string(), IndexKind::Ascending)];

    match indexes.iter().find(|index| index.keys == keys) {
        Some(index) if index.unique => ProbeResult::pass(&probe, format!("index '{}'", index.name)),
        Some(index) => ProbeResult::fail(
            &probe,
            format!("index '{}' does not enforce uniqueness", index.name),
        ),
        None => ProbeResult::fail(&probe, format!("no index on '{}'", field)),
    }
}

/// A lookup by owner must be answered by an index scan on `user_id_1`
pub fn check_lookup_plan(plan: &QueryPlan) -> ProbeResult {
    let probe = "stories by user_id";
    if plan.has_stage("COLLSCAN") {
        return ProbeResult::fail(probe, format!("collection scan: {}", plan.describe()));
    }
    if plan.has_stage("IXSCAN") && plan.uses_index("user_id_1") {
        return ProbeResult::pass(probe, plan.describe());
    }
    ProbeResult::fail(
        probe,
        format!("index user_id_1 not used: {}", plan.describe()),
    )
}

/// A reverse-chronological sort must not need a blocking sort stage
pub fn check_sort_plan(plan: &QueryPlan) -> ProbeResult {
    let probe = "stories by created_at desc";
    if plan.has_stage("SORT") {
        return ProbeResult::fail(probe, format!("in-memory sort: {}", plan.describe()));
    }
    if plan.uses_index("created_at_-1") {
        return ProbeResult::pass(probe, plan.describe());
    }
    ProbeResult::fail(
        probe,
        format!("index created_at_-1 not used: {}", plan.describe()),
    )
}

/// A `$text` query must plan a text stage
pub fn check_text_plan(plan: &QueryPlan) -> ProbeResult {
    let probe = "stories text search";
    let text_stage = plan
        .stages
        .iter()
        .any(|stage| stage == "TEXT" || stage.starts_with("TEXT_"));
    if text_stage {
        ProbeResult::pass(probe, plan.describe())
    } else {
        ProbeResult::fail(probe, format!("no text stage: {}", plan.describe()))
    }
}

/// Runs the verification probes against a live database
pub struct SchemaVerifier<'a> {
    conn: &'a DatabaseConn,
}

impl<'a> SchemaVerifier<'a> {
    pub fn new(conn: &'a DatabaseConn) -> Self {
        Self { conn }
    }

    /// Run every probe
    ///
    /// Connection and permission failures abort; anything else the engine
    /// rejects becomes a failed probe.
    pub async fn run(&self) -> Result<VerifyReport, SchemaError> {
        let mut probes = Vec::new();

        let users = self.conn.indexes(SchemaDefinitions::USERS).await?;
        probes.push(check_unique(&users, SchemaDefinitions::USERS, fields::EMAIL));
        probes.push(check_unique(&users, SchemaDefinitions::USERS, fields::USERNAME));

        let lookup = self
            .explain(doc! {
                "find": SchemaDefinitions::STORIES,
                "filter": { "user_id": PROBE_USER_ID },
            })
            .await;
        probes.push(probe_or_fail("stories by user_id", lookup, check_lookup_plan)?);

        let sorted = self
            .explain(doc! {
                "find": SchemaDefinitions::STORIES,
                "filter": {},
                "sort": { "created_at": -1 },
            })
            .await;
        probes.push(probe_or_fail(
            "stories by created_at desc",
            sorted,
            check_sort_plan,
        )?);

        probes.push(self.text_probe().await?);

        Ok(VerifyReport {
            database: self.conn.database_name().to_string(),
            probes,
        })
    }

    async fn explain(&self, find: Document) -> Result<Document, SchemaError> {
        debug!("explain {}", find);
        self.conn
            .run_command(
                SchemaDefinitions::STORIES,
                doc! { "explain": find, "verbosity": "queryPlanner" },
            )
            .await
    }

    async fn text_probe(&self) -> Result<ProbeResult, SchemaError> {
        let filter = doc! { "$text": { "$search": PROBE_TEXT } };
        let score = doc! { "score": { "$meta": "textScore" } };

        let plan = self
            .explain(doc! {
                "find": SchemaDefinitions::STORIES,
                "filter": filter.clone(),
                "projection": score.clone(),
                "sort": score.clone(),
            })
            .await;
        let result = probe_or_fail("stories text search", plan, check_text_plan)?;
        if !result.passed {
            return Ok(result);
        }

        // the ranked query itself has to run as well
        let stories = self
            .conn
            .database()
            .collection::<Document>(SchemaDefinitions::STORIES);
        let ranked: Result<Vec<Document>, _> = match stories
            .find(filter)
            .projection(score.clone())
            .sort(score)
            .limit(5)
            .await
        {
            Ok(cursor) => cursor.try_collect().await,
            Err(e) => Err(e),
        };

        match ranked {
            Ok(matches) => Ok(ProbeResult::pass(
                &result.probe,
                format!("{}; {} ranked match(es)", result.detail, matches.len()),
            )),
            Err(e) => match SchemaError::classify(e, SchemaDefinitions::STORIES, None) {
                err @ (SchemaError::Connection { .. } | SchemaError::PermissionDenied { .. }) => {
                    Err(err)
                }
                err => Ok(ProbeResult::fail(&result.probe, err.to_string())),
            },
        }
    }
}

/// Turn an explain reply into a probe result
fn probe_or_fail(
    probe: &str,
    explain: Result<Document, SchemaError>,
    check: fn(&QueryPlan) -> ProbeResult,
) -> Result<ProbeResult, SchemaError> {
    match explain {
        Ok(reply) => match QueryPlan::from_explain(&reply) {
            Some(plan) => Ok(check(&plan)),
            None => Ok(ProbeResult::fail(probe, "unrecognized explain output")),
        },
        Err(err @ (SchemaError::Connection { .. } | SchemaError::PermissionDenied { .. })) => {
            Err(err)
        }
        Err(err) if err.server_code() == Some(codes::INDEX_NOT_FOUND) => {
            Ok(ProbeResult::fail(probe, "text index missing"))
        }
        Err(err) => Ok(ProbeResult::fail(probe, err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classic_lookup() -> Document {
        doc! {
            "queryPlanner": {
                "namespace": "film_assist_db.stories",
                "winningPlan": {
                    "stage": "FETCH",
                    "inputStage": {
                        "stage": "IXSCAN",
                        "keyPattern": { "user_id": 1 },
                        "indexName": "user_id_1",
                    },
                },
                "rejectedPlans": [],
            },
            "ok": 1.0,
        }
    }

    #[test]
    fn test_classic_plan() {
        let plan = QueryPlan::from_explain(&classic_lookup()).unwrap();
        assert_eq!(plan.stages, vec!["FETCH", "IXSCAN"]);
        assert!(plan.uses_index("user_id_1"));
        assert!(check_lookup_plan(&plan).passed);
    }

    #[test]
    fn test_collection_scan_fails_lookup() {
        let explain = doc! {
            "queryPlanner": { "winningPlan": { "stage": "COLLSCAN", "direction": "forward" } }
        };
        let plan = QueryPlan::from_explain(&explain).unwrap();
        let result = check_lookup_plan(&plan);
        assert!(!result.passed);
        assert!(result.detail.starts_with("collection scan"));
    }

    #[test]
    fn test_slot_based_plan() {
        let explain = doc! {
            "queryPlanner": {
                "winningPlan": {
                    "queryPlan": {
                        "stage": "LIMIT",
                        "inputStage": {
                            "stage": "FETCH",
                            "inputStage": {
                                "stage": "IXSCAN",
                                "indexName": "created_at_-1",
                                "direction": "forward",
                            },
                        },
                    },
                    "slotBasedPlan": { "slots": "..." },
                },
            },
        };
        let plan = QueryPlan::from_explain(&explain).unwrap();
        assert!(check_sort_plan(&plan).passed);
    }

    #[test]
    fn test_blocking_sort_fails() {
        let explain = doc! {
            "queryPlanner": {
                "winningPlan": {
                    "stage": "SORT",
                    "sortPattern": { "created_at": -1 },
                    "inputStage": { "stage": "COLLSCAN" },
                },
            },
        };
        let plan = QueryPlan::from_explain(&explain).unwrap();
        let result = check_sort_plan(&plan);
        assert!(!result.passed);
        assert!(result.detail.contains("SORT"));
    }

    #[test]
    fn test_text_plan() {
        let explain = doc! {
            "queryPlanner": {
                "winningPlan": {
                    "stage": "SORT",
                    "inputStage": {
                        "stage": "TEXT_MATCH",
                        "inputStage": {
                            "stage": "TEXT_OR",
                            "inputStages": [
                                { "stage": "IXSCAN", "indexName": "title_text_theme_text" }
                            ],
                        },
                    },
                },
            },
        };
        let plan = QueryPlan::from_explain(&explain).unwrap();
        assert!(plan.uses_index("title_text_theme_text"));
        assert!(check_text_plan(&plan).passed);
    }

    #[test]
    fn test_sharded_plan() {
        let explain = doc! {
            "queryPlanner": {
                "winningPlan": {
                    "stage": "SINGLE_SHARD",
                    "shards": [
                        { "shardName": "rs0", "winningPlan": {
                            "stage": "FETCH",
                            "inputStage": { "stage": "IXSCAN", "indexName": "user_id_1" },
                        } }
                    ],
                },
            },
        };
        let plan = QueryPlan::from_explain(&explain).unwrap();
        assert!(check_lookup_plan(&plan).passed);
    }

    #[test]
    fn test_unrecognized_explain() {
        assert_eq!(QueryPlan::from_explain(&doc! { "ok": 1.0 }), None);
        let result = probe_or_fail("p", Ok(doc! { "ok": 1.0 }), check_lookup_plan).unwrap();
        assert!(!result.passed);
    }

    #[test]
    fn test_probe_errors() {
        let err = SchemaError::Connection {
            message: "down".to_string(),
        };
        assert!(probe_or_fail("p", Err(err), check_text_plan).is_err());

        let err = SchemaError::Database {
            code: Some(codes::INDEX_NOT_FOUND),
            message: "text index required for $text query".to_string(),
        };
        let result = probe_or_fail("p", Err(err), check_text_plan).unwrap();
        assert_eq!(result.detail, "text index missing");
    }

    #[test]
    fn test_check_unique() {
        let indexes = vec![
            ExistingIndex::id_index(),
            ExistingIndex::new(
                "email_1",
                vec![("email".to_string(), IndexKind::Ascending)],
                true,
            ),
            ExistingIndex::new(
                "username_1",
                vec![("username".to_string(), IndexKind::Ascending)],
                false,
            ),
        ];

        assert!(check_unique(&indexes, "users", "email").passed);
        assert!(!check_unique(&indexes, "users", "username").passed);
        assert_eq!(
            check_unique(&indexes[..1], "users", "email").detail,
            "no index on 'email'"
        );
    }

    #[test]
    fn test_report_counts() {
        let report = VerifyReport {
            database: "film_assist_db".to_string(),
            probes: vec![ProbeResult::pass("a", ""), ProbeResult::fail("b", "")],
        };
        assert!(!report.all_passed());
        assert_eq!(report.failed_count(), 1);
    }
}
