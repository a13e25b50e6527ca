//! Session Markdown Codec
//!
//! Sessions persist as markdown: YAML frontmatter, one `## Turn N — role`
//! heading per turn, and tool calls as `### Tool: name` blocks carrying an
//! `**Input:**` JSON fence and a `<details>` result body. The writer and
//! parser round-trip every non-aliased field.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use regex::Regex;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Codec error types
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Structurally invalid session markdown
    #[error("Session parse error: {0}")]
    Parse(String),
}

// ============================================================================
// SESSION TYPES
// ============================================================================

/// A persisted conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session id
    pub id: String,
    /// Title
    pub title: String,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Last update time
    pub updated: DateTime<Utc>,
    /// Agent name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Model name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Owning project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Parent session id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Branch name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Accumulated cost
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    /// Accumulated token count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    /// Conversation turns in order
    #[serde(default)]
    pub turns: Vec<Turn>,
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// Speaker role (`user`, `assistant`, `system`)
    pub role: String,
    /// Per-turn agent override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Per-turn model override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Turn text
    pub content: String,
    /// Tool calls made during the turn
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// A tool invocation within a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Tool name
    pub name: String,
    /// JSON input payload
    pub input: serde_json::Value,
    /// Result or error text
    pub outcome: ToolOutcome,
}

/// Outcome of a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolOutcome {
    /// Successful result text
    Result(String),
    /// Error text
    Error(String),
}

// ============================================================================
// WRITER
// ============================================================================

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Render a session to markdown.
pub fn write_markdown(session: &Session) -> String {
    let mut out = String::from("---\n");
    out.push_str(&format!("id: {}\n", session.id));
    out.push_str(&format!("title: {}\n", session.title));
    out.push_str(&format!("created: {}\n", format_time(session.created)));
    out.push_str(&format!("updated: {}\n", format_time(session.updated)));
    if let Some(agent) = &session.agent {
        out.push_str(&format!("agent: {}\n", agent));
    }
    if let Some(model) = &session.model {
        out.push_str(&format!("model: {}\n", model));
    }
    if let Some(project) = &session.project {
        out.push_str(&format!("project: {}\n", project));
    }
    if let Some(parent) = &session.parent {
        out.push_str(&format!("parent: {}\n", parent));
    }
    if let Some(branch) = &session.branch {
        out.push_str(&format!("branch: {}\n", branch));
    }
    if !session.tags.is_empty() {
        out.push_str(&format!("tags: {}\n", session.tags.join(", ")));
    }
    if let Some(cost) = session.total_cost {
        out.push_str(&format!("totalCost: {}\n", cost));
    }
    if let Some(tokens) = session.total_tokens {
        out.push_str(&format!("totalTokens: {}\n", tokens));
    }
    out.push_str("---\n");

    for (index, turn) in session.turns.iter().enumerate() {
        out.push('\n');
        match (&turn.agent, &turn.model) {
            (Some(agent), Some(model)) => out.push_str(&format!(
                "## Turn {} — {} (agent: {}, model: {})\n\n",
                index + 1,
                turn.role,
                agent,
                model
            )),
            _ => out.push_str(&format!("## Turn {} — {}\n\n", index + 1, turn.role)),
        }
        if !turn.content.is_empty() {
            out.push_str(turn.content.trim_end());
            out.push('\n');
        }

        for call in &turn.tool_calls {
            out.push_str(&format!("\n### Tool: {}\n\n", call.name));
            out.push_str("**Input:**\n```json\n");
            out.push_str(
                &serde_json::to_string_pretty(&call.input).unwrap_or_else(|_| "null".to_string()),
            );
            out.push_str("\n```\n");
            let (summary, body) = match &call.outcome {
                ToolOutcome::Result(text) => ("Result", text),
                ToolOutcome::Error(text) => ("Error", text),
            };
            out.push_str(&format!(
                "<details><summary>{}</summary>\n\n{}\n\n</details>\n",
                summary,
                body.trim_end()
            ));
        }
    }

    out
}

// ============================================================================
// PARSER
// ============================================================================

static TURN_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^## Turn (\d+) — (\w+)(?: \(agent: ([^,]+), model: ([^)]+)\))?\s*$")
        .expect("turn heading pattern")
});

static TOOL_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^### Tool: (.+?)\s*$").expect("tool heading pattern"));

static DETAILS_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<details><summary>(Result|Error)</summary>\s*$").expect("details pattern")
});

fn parse_time(value: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CodecError::Parse(format!("bad timestamp {:?}: {}", value, e)))
}

/// Parse session markdown produced by [`write_markdown`].
pub fn parse_markdown(text: &str) -> Result<Session, CodecError> {
    let rest = text
        .strip_prefix("---\n")
        .ok_or_else(|| CodecError::Parse("missing frontmatter".to_string()))?;
    let (frontmatter, body) = rest
        .split_once("\n---\n")
        .ok_or_else(|| CodecError::Parse("unterminated frontmatter".to_string()))?;

    let mut session = Session {
        id: String::new(),
        title: String::new(),
        created: Utc::now(),
        updated: Utc::now(),
        agent: None,
        model: None,
        project: None,
        parent: None,
        branch: None,
        tags: Vec::new(),
        total_cost: None,
        total_tokens: None,
        turns: Vec::new(),
    };

    for line in frontmatter.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "id" => session.id = value.to_string(),
            "title" => session.title = value.to_string(),
            "created" => session.created = parse_time(value)?,
            "updated" => session.updated = parse_time(value)?,
            "agent" => session.agent = Some(value.to_string()),
            "model" => session.model = Some(value.to_string()),
            "project" => session.project = Some(value.to_string()),
            "parent" => session.parent = Some(value.to_string()),
            "branch" => session.branch = Some(value.to_string()),
            "tags" => {
                session.tags = value
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            }
            "totalCost" => session.total_cost = value.parse().ok(),
            "totalTokens" => session.total_tokens = value.parse().ok(),
            _ => {}
        }
    }

    if session.id.is_empty() {
        return Err(CodecError::Parse("frontmatter missing id".to_string()));
    }

    parse_turns(body, &mut session)?;
    Ok(session)
}

fn parse_turns(body: &str, session: &mut Session) -> Result<(), CodecError> {
    let lines: Vec<&str> = body.lines().collect();
    let mut i = 0usize;

    while i < lines.len() {
        let Some(caps) = TURN_HEADING.captures(lines[i]) else {
            i += 1;
            continue;
        };

        let role = caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| CodecError::Parse("turn heading missing role".to_string()))?;
        let agent = caps.get(3).map(|m| m.as_str().trim().to_string());
        let model = caps.get(4).map(|m| m.as_str().trim().to_string());
        i += 1;

        // Content runs until the next turn, tool block, or end
        let mut content_lines: Vec<&str> = Vec::new();
        while i < lines.len()
            && !TURN_HEADING.is_match(lines[i])
            && !TOOL_HEADING.is_match(lines[i])
        {
            content_lines.push(lines[i]);
            i += 1;
        }

        let mut turn = Turn {
            role,
            agent,
            model,
            content: content_lines.join("\n").trim().to_string(),
            tool_calls: Vec::new(),
        };

        // Tool blocks, separated by blank lines
        loop {
            let mut j = i;
            while j < lines.len() && lines[j].trim().is_empty() {
                j += 1;
            }
            let Some(tool_caps) = lines.get(j).and_then(|l| TOOL_HEADING.captures(l)) else {
                break;
            };
            i = j;
            let name = tool_caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| CodecError::Parse("tool heading missing name".to_string()))?;
            i += 1;

            // **Input:** then a json fence
            while i < lines.len() && lines[i].trim() != "**Input:**" {
                if TURN_HEADING.is_match(lines[i]) || TOOL_HEADING.is_match(lines[i]) {
                    return Err(CodecError::Parse(format!("tool {} missing input", name)));
                }
                i += 1;
            }
            i += 1;
            while i < lines.len() && !lines[i].starts_with("```") {
                i += 1;
            }
            i += 1;
            let mut json_lines: Vec<&str> = Vec::new();
            while i < lines.len() && !lines[i].starts_with("```") {
                json_lines.push(lines[i]);
                i += 1;
            }
            i += 1;
            let input: serde_json::Value = serde_json::from_str(&json_lines.join("\n"))
                .map_err(|e| CodecError::Parse(format!("tool {} input: {}", name, e)))?;

            // <details> outcome block
            while i < lines.len() && !DETAILS_OPEN.is_match(lines[i]) {
                if TURN_HEADING.is_match(lines[i]) || TOOL_HEADING.is_match(lines[i]) {
                    return Err(CodecError::Parse(format!("tool {} missing outcome", name)));
                }
                i += 1;
            }
            let is_error = lines
                .get(i)
                .and_then(|l| DETAILS_OPEN.captures(l))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str() == "Error")
                .ok_or_else(|| CodecError::Parse(format!("tool {} missing outcome", name)))?;
            i += 1;
            let mut outcome_lines: Vec<&str> = Vec::new();
            while i < lines.len() && lines[i].trim() != "</details>" {
                outcome_lines.push(lines[i]);
                i += 1;
            }
            i += 1;
            let body_text = outcome_lines.join("\n").trim().to_string();

            turn.tool_calls.push(ToolCall {
                name,
                input,
                outcome: if is_error {
                    ToolOutcome::Error(body_text)
                } else {
                    ToolOutcome::Result(body_text)
                },
            });
        }

        session.turns.push(turn);
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
