//! Offline evaluation of recorded events.
//!
//! Input is a JSON-lines file, one event per line:
//!
//! ```json
//! {"class": "open", "event": {"process": {"pid": 1, "uid": 0, "gid": 0}, "call": {"major": 2, "minor": 64, "args": [{"type": "Path", "content": {"name": "/etc/x"}}]}}}
//! ```

use std::io::BufRead;

use anyhow::{Context, Result};
use audit_filter::AuditEngine;
use serde::{Deserialize, Serialize};
use vigil_core::{Actions, EventClass, EventContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub class: EventClass,
    pub event: EventContext,
}

/// Decision taken for one replayed event.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub line: usize,
    pub class: EventClass,
    pub event: EventContext,
    pub actions: Actions,
    /// Evaluation error, in which case the event is not logged.
    pub error: Option<String>,
}

pub fn replay<R: BufRead>(engine: &AuditEngine, input: R) -> Result<Vec<ReplayOutcome>> {
    let mut outcomes = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = line.with_context(|| format!("Error reading line {line_number}"))?;
        if line.trim().is_empty() {
            continue;
        }

        let ReplayRecord { class, mut event } = serde_json::from_str(&line)
            .with_context(|| format!("Error parsing event at line {line_number}"))?;

        let (actions, error) = match engine.policy_action_for(class, &mut event) {
            Ok(actions) => (actions, None),
            Err(err) => {
                log::warn!("line {line_number}: evaluation of {class} event failed: {err}");
                (Actions::NONE, Some(err.to_string()))
            }
        };

        outcomes.push(ReplayOutcome {
            line: line_number,
            class,
            event,
            actions,
            error,
        });
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use audit_filter::{
        CapturedArguments, FilterBody, FilterDefinition, PolicySet, TargetCode, fs::MemoryFileSystem,
        target::codes,
    };

    use super::*;

    fn engine() -> AuditEngine {
        let engine = AuditEngine::new(
            Box::new(CapturedArguments),
            Box::new(MemoryFileSystem::new().file("/etc/passwd")),
        );
        let filters = [
            FilterDefinition::new(
                1,
                FilterBody::Prefix {
                    path: "/etc".to_string(),
                },
            ),
            FilterDefinition::tagged(
                2,
                "etc",
                FilterBody::Apply {
                    target: TargetCode(codes::call_arg(0)),
                    predicate: 1,
                },
            ),
        ];
        for filter in &filters {
            engine.create_filter(filter).unwrap();
        }
        engine
            .set_policy(&PolicySet {
                class: "open".parse().unwrap(),
                action: Actions::NONE,
                filter: Some(2),
            })
            .unwrap();
        engine
    }

    #[test]
    fn replay_lines() {
        let input = r#"{"class": "open", "event": {"process": {"pid": 7, "uid": 0, "gid": 0}, "call": {"major": 2, "args": [{"type": "Path", "content": {"name": "/etc/passwd"}}]}}}

{"class": "open", "event": {"process": {"pid": 7, "uid": 0, "gid": 0}, "call": {"major": 2, "args": [{"type": "Path", "content": {"name": "/tmp/x", "lookup": {"object": null}}}]}}}
{"class": "open", "event": {"process": {"pid": 8, "uid": 0, "gid": 0}}}
{"class": "login", "event": {"process": {"pid": 9, "uid": 0, "gid": 0}}}
"#;
        let outcomes = replay(&engine(), input.as_bytes()).unwrap();

        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].line, 1);
        assert_eq!(outcomes[0].actions, Actions::LOG);
        assert_eq!(outcomes[0].event.tag(), Some("etc"));

        assert_eq!(outcomes[1].line, 3);
        assert_eq!(outcomes[1].actions, Actions::NONE);

        // no call data: the argument target is undefined
        assert_eq!(outcomes[2].actions, Actions::NONE);
        assert!(outcomes[2].error.is_some());

        assert_eq!(outcomes[3].actions, Actions::NONE);
        assert!(outcomes[3].error.is_none());
    }

    #[test]
    fn malformed_line() {
        let err = replay(&engine(), "{\"class\": \"open\"}\n".as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("line 1"));
    }

    #[test]
    fn bundled_demo() {
        let demos = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
        let engine = AuditEngine::new(
            Box::new(CapturedArguments),
            Box::new(MemoryFileSystem::new().dir("/etc/cron.d").file("/etc/shadow")),
        );
        crate::rules::load_rules(&engine, &[demos.join("rules")]).unwrap();

        let events = std::fs::read_to_string(demos.join("events.jsonl")).unwrap();
        let outcomes = replay(&engine, events.as_bytes()).unwrap();

        let decisions: Vec<_> = outcomes
            .iter()
            .map(|outcome| (outcome.actions, outcome.event.tag()))
            .collect();
        assert_eq!(
            decisions,
            [
                (Actions::LOG, Some("etc-create")),
                (Actions::NONE, None),
                (Actions::NONE, None),
                (Actions::LOG, None),
                (Actions::LOG | Actions::VERBOSE, Some("root")),
            ]
        );
        assert!(outcomes.iter().all(|outcome| outcome.error.is_none()));
    }
}
