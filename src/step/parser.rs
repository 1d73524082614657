//! Artifact parsing from model responses.
//!
//! Responses embed pseudo-XML markup:
//! - `<boltArtifact id=".." title="..">` ... `</boltArtifact>` groups actions
//! - `<boltAction type="file" filePath="..">body</boltAction>` writes a file
//! - `<boltAction type="shell">cmd</boltAction>` runs a command
//! - `<execute><command>cmd</command></execute>` runs a command, anywhere
//!
//! The text is tokenized once into the tags above; two independent passes
//! then walk the tag stream as small state machines. Artifact actions are
//! numbered first (document order), then execute commands.
//!
//! A block whose closing tag never arrives before another opening tag of the
//! same or enclosing kind is discarded, and scanning resumes at that opening
//! tag. Parsing never fails: malformed markup only shrinks the result.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{Step, StepAction, StepId};

static ATTR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// Metadata of one closed artifact block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Number of steps the artifact contributed.
    pub actions: usize,
}

/// Everything extracted from one response.
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    pub artifacts: Vec<ArtifactInfo>,
    pub steps: Vec<Step>,
}

/// Parse a response into pending steps numbered from 1.
pub fn parse(text: &str) -> Vec<Step> {
    parse_response(text).steps
}

/// Parse a response, keeping artifact metadata alongside the steps.
pub fn parse_response(text: &str) -> ParsedResponse {
    let tags = tokenize(text);
    let mut next_id: StepId = 1;
    let mut response = ParsedResponse::default();

    for (info, actions) in scan_artifacts(text, &tags) {
        response.artifacts.push(ArtifactInfo {
            actions: actions.len(),
            ..info
        });
        for action in actions {
            response.steps.push(Step::new(next_id, action));
            next_id += 1;
        }
    }

    for command in scan_execute_blocks(text, &tags) {
        response
            .steps
            .push(Step::new(next_id, StepAction::ExecuteCommand { command }));
        next_id += 1;
    }

    response
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagName {
    Artifact,
    Action,
    Execute,
    Command,
}

impl TagName {
    const ALL: [TagName; 4] = [Self::Artifact, Self::Action, Self::Execute, Self::Command];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Artifact => "boltArtifact",
            Self::Action => "boltAction",
            Self::Execute => "execute",
            Self::Command => "command",
        }
    }
}

/// One recognised tag. `start..end` spans the tag itself in the source text.
#[derive(Debug, Clone, Copy)]
struct Tag<'a> {
    name: TagName,
    closing: bool,
    attrs: &'a str,
    start: usize,
    end: usize,
}

fn tokenize(text: &str) -> Vec<Tag<'_>> {
    let mut tags = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('<') {
        let start = pos + offset;
        let rest = &text[start + 1..];
        let (closing, rest) = match rest.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };

        let Some(name) = TagName::ALL
            .into_iter()
            .find(|name| starts_with_tag_name(rest, name.as_str()))
        else {
            pos = start + 1;
            continue;
        };

        let after_name = start + 1 + usize::from(closing) + name.as_str().len();
        match find_tag_end(text, after_name) {
            Some(end) => {
                tags.push(Tag {
                    name,
                    closing,
                    attrs: &text[after_name..end - 1],
                    start,
                    end,
                });
                pos = end;
            }
            None => pos = start + 1,
        }
    }

    tags
}

fn starts_with_tag_name(rest: &str, name: &str) -> bool {
    rest.strip_prefix(name).is_some_and(|after| {
        after.starts_with(|c: char| c == '>' || c == '/' || c.is_whitespace())
    })
}

/// Index just past the `>` closing a tag, honoring quoted attribute values.
/// A bare `<` before the `>` means the tag is malformed.
fn find_tag_end(text: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in text[from..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(from + i + 1),
            (None, '<') => return None,
            (None, _) => {}
        }
    }
    None
}

fn attributes(raw: &str) -> HashMap<&str, &str> {
    let mut attrs = HashMap::new();
    for cap in ATTR_REGEX.captures_iter(raw) {
        let (Some(key), Some(value)) = (cap.get(1), cap.get(2).or_else(|| cap.get(3))) else {
            continue;
        };
        attrs.entry(key.as_str()).or_insert(value.as_str());
    }
    attrs
}

enum ArtifactState<'a> {
    Outside,
    InArtifact {
        attrs: &'a str,
        actions: Vec<StepAction>,
    },
    InAction {
        attrs: &'a str,
        actions: Vec<StepAction>,
        action_attrs: &'a str,
        body_start: usize,
    },
}

impl<'a> ArtifactState<'a> {
    fn open(tag: &Tag<'a>) -> Self {
        Self::InArtifact {
            attrs: tag.attrs,
            actions: Vec::new(),
        }
    }
}

fn scan_artifacts<'a>(text: &'a str, tags: &[Tag<'a>]) -> Vec<(ArtifactInfo, Vec<StepAction>)> {
    let mut closed = Vec::new();
    let mut state = ArtifactState::Outside;

    for tag in tags {
        state = match (state, tag.name, tag.closing) {
            (ArtifactState::Outside, TagName::Artifact, false) => ArtifactState::open(tag),
            (ArtifactState::Outside, _, _) => ArtifactState::Outside,

            (ArtifactState::InArtifact { .. }, TagName::Artifact, false) => {
                debug!(at = tag.start, "discarding unterminated artifact");
                ArtifactState::open(tag)
            }
            (ArtifactState::InArtifact { attrs, actions }, TagName::Artifact, true) => {
                closed.push((artifact_info(attrs), actions));
                ArtifactState::Outside
            }
            (ArtifactState::InArtifact { attrs, actions }, TagName::Action, false) => {
                ArtifactState::InAction {
                    attrs,
                    actions,
                    action_attrs: tag.attrs,
                    body_start: tag.end,
                }
            }
            (state @ ArtifactState::InArtifact { .. }, _, _) => state,

            (
                ArtifactState::InAction {
                    attrs,
                    mut actions,
                    action_attrs,
                    body_start,
                },
                TagName::Action,
                true,
            ) => {
                if let Some(action) = build_action(action_attrs, &text[body_start..tag.start]) {
                    actions.push(action);
                }
                ArtifactState::InArtifact { attrs, actions }
            }
            (ArtifactState::InAction { attrs, actions, .. }, TagName::Action, false) => {
                debug!(at = tag.start, "discarding unterminated action");
                ArtifactState::InAction {
                    attrs,
                    actions,
                    action_attrs: tag.attrs,
                    body_start: tag.end,
                }
            }
            (ArtifactState::InAction { attrs, actions, .. }, TagName::Artifact, true) => {
                debug!(at = tag.start, "discarding unterminated action");
                closed.push((artifact_info(attrs), actions));
                ArtifactState::Outside
            }
            (ArtifactState::InAction { .. }, TagName::Artifact, false) => {
                debug!(at = tag.start, "discarding unterminated action and artifact");
                ArtifactState::open(tag)
            }
            // Execute and command tags inside an action body are plain text.
            (state @ ArtifactState::InAction { .. }, _, _) => state,
        };
    }

    closed
}

fn artifact_info(raw: &str) -> ArtifactInfo {
    let attrs = attributes(raw);
    ArtifactInfo {
        id: attrs.get("id").map(|s| s.to_string()),
        title: attrs.get("title").map(|s| s.to_string()),
        actions: 0,
    }
}

fn build_action(raw_attrs: &str, body: &str) -> Option<StepAction> {
    let attrs = attributes(raw_attrs);
    match attrs.get("type").copied() {
        Some("file") => {
            let path = attrs.get("filePath").map(|p| p.trim()).unwrap_or_default();
            if path.is_empty() {
                debug!("dropping file action without filePath");
                return None;
            }
            Some(StepAction::CreateFile {
                path: path.to_string(),
                content: body.trim().to_string(),
            })
        }
        Some("shell") => {
            let command = body.trim();
            if command.is_empty() {
                return None;
            }
            Some(StepAction::RunCommand {
                command: command.to_string(),
            })
        }
        other => {
            debug!(action_type = ?other, "ignoring action with unknown type");
            None
        }
    }
}

enum ExecuteState {
    Outside,
    InExecute { commands: Vec<String> },
    InCommand { commands: Vec<String>, body_start: usize },
}

fn scan_execute_blocks(text: &str, tags: &[Tag<'_>]) -> Vec<String> {
    let mut found = Vec::new();
    let mut state = ExecuteState::Outside;

    for tag in tags {
        state = match (state, tag.name, tag.closing) {
            (ExecuteState::Outside, TagName::Execute, false) => ExecuteState::InExecute {
                commands: Vec::new(),
            },
            (ExecuteState::Outside, _, _) => ExecuteState::Outside,

            (ExecuteState::InExecute { .. }, TagName::Execute, false) => {
                debug!(at = tag.start, "discarding unterminated execute block");
                ExecuteState::InExecute {
                    commands: Vec::new(),
                }
            }
            (ExecuteState::InExecute { commands }, TagName::Execute, true) => {
                found.extend(commands);
                ExecuteState::Outside
            }
            (ExecuteState::InExecute { commands }, TagName::Command, false) => {
                ExecuteState::InCommand {
                    commands,
                    body_start: tag.end,
                }
            }
            (state @ ExecuteState::InExecute { .. }, _, _) => state,

            (
                ExecuteState::InCommand {
                    mut commands,
                    body_start,
                },
                TagName::Command,
                true,
            ) => {
                let command = text[body_start..tag.start].trim();
                if !command.is_empty() {
                    commands.push(command.to_string());
                }
                ExecuteState::InExecute { commands }
            }
            (ExecuteState::InCommand { commands, .. }, TagName::Command, false) => {
                debug!(at = tag.start, "discarding unterminated command");
                ExecuteState::InCommand {
                    commands,
                    body_start: tag.end,
                }
            }
            (ExecuteState::InCommand { commands, .. }, TagName::Execute, true) => {
                debug!(at = tag.start, "discarding unterminated command");
                found.extend(commands);
                ExecuteState::Outside
            }
            (ExecuteState::InCommand { .. }, TagName::Execute, false) => {
                debug!(at = tag.start, "discarding unterminated command and execute block");
                ExecuteState::InExecute {
                    commands: Vec::new(),
                }
            }
            (state @ ExecuteState::InCommand { .. }, _, _) => state,
        };
    }

    found
}
