//! Typed task payloads.
//!
//! The datastore keeps `task_type` and `input_data` as separate columns. Known
//! task types decode into their own brief; anything else is carried as
//! `Untyped` and skips structural validation.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::types::LifecycleStage;

pub mod task_types {
    pub const SPOTLIGHT: &str = "spotlight";
    pub const SYNTHESIS: &str = "synthesis";
    pub const NEWSLETTER: &str = "newsletter";
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotlightBrief {
    pub topic_key: String,
    pub topic_name: String,
    pub issue_number: i32,
    pub lifecycle_stage: LifecycleStage,
    pub velocity: f64,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicBrief {
    pub topic_key: String,
    pub lifecycle_stage: LifecycleStage,
    pub velocity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisBrief {
    pub issue_number: i32,
    pub topics: Vec<TopicBrief>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterBrief {
    pub issue_number: i32,
    #[serde(default)]
    pub spotlight_ids: Vec<Uuid>,
    #[serde(default)]
    pub scorecard_prediction_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskInput {
    Spotlight(SpotlightBrief),
    Synthesis(SynthesisBrief),
    Newsletter(NewsletterBrief),
    Untyped { task_type: String, input: Value },
}

impl TaskInput {
    /// Decode a stored `(task_type, input_data)` pair.
    ///
    /// A known type whose input does not match its brief degrades to
    /// `Untyped` rather than being rejected.
    pub fn from_parts(task_type: &str, input: Value) -> Self {
        match task_type {
            task_types::SPOTLIGHT => decode_or_untyped(task_type, input, Self::Spotlight),
            task_types::SYNTHESIS => decode_or_untyped(task_type, input, Self::Synthesis),
            task_types::NEWSLETTER => decode_or_untyped(task_type, input, Self::Newsletter),
            other => Self::Untyped {
                task_type: other.to_string(),
                input,
            },
        }
    }

    pub fn task_type(&self) -> &str {
        match self {
            Self::Spotlight(_) => task_types::SPOTLIGHT,
            Self::Synthesis(_) => task_types::SYNTHESIS,
            Self::Newsletter(_) => task_types::NEWSLETTER,
            Self::Untyped { task_type, .. } => task_type,
        }
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Self::Spotlight(brief) => serde_json::to_value(brief),
            Self::Synthesis(brief) => serde_json::to_value(brief),
            Self::Newsletter(brief) => serde_json::to_value(brief),
            Self::Untyped { input, .. } => Ok(input.clone()),
        }
    }

    pub fn issue_number(&self) -> Option<i32> {
        match self {
            Self::Spotlight(brief) => Some(brief.issue_number),
            Self::Synthesis(brief) => Some(brief.issue_number),
            Self::Newsletter(brief) => Some(brief.issue_number),
            Self::Untyped { .. } => None,
        }
    }
}

fn decode_or_untyped<T: DeserializeOwned>(
    task_type: &str,
    input: Value,
    wrap: fn(T) -> TaskInput,
) -> TaskInput {
    match serde_json::from_value::<T>(input.clone()) {
        Ok(brief) => wrap(brief),
        Err(e) => {
            warn!(task_type, error = %e, "Task input does not match its type, treating as untyped");
            TaskInput::Untyped {
                task_type: task_type.to_string(),
                input,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Result of a spotlight or synthesis task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub thesis: String,
    pub evidence: String,
    pub counter_argument: String,
    pub prediction: String,
    pub builder_implications: String,
    #[serde(default)]
    pub sources_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterOutput {
    pub subject: String,
    /// Markdown body.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Analysis(AnalysisOutput),
    Newsletter(NewsletterOutput),
    Untyped(Value),
}

impl TaskOutput {
    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Self::Analysis(out) => serde_json::to_value(out),
            Self::Newsletter(out) => serde_json::to_value(out),
            Self::Untyped(value) => Ok(value.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Fields of an analysis output that were present and well-formed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartialAnalysis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thesis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_argument: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builder_implications: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources_used: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartialNewsletter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PartialOutput {
    Analysis(PartialAnalysis),
    Newsletter(PartialNewsletter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    WrongType,
    Empty,
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::WrongType => write!(f, "wrong type"),
            Self::Empty => write!(f, "empty"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub problem: FieldProblem,
}

/// Output that did not match the shape its task type requires.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid output: {}", describe_fields(.fields))]
pub struct ValidationError {
    pub partial: PartialOutput,
    pub fields: Vec<FieldError>,
}

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|e| format!("{} ({})", e.field, e.problem))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check a raw agent result against the shape its task type expects.
pub fn validate_output(input: &TaskInput, raw: &Value) -> Result<TaskOutput, ValidationError> {
    match input {
        TaskInput::Spotlight(_) | TaskInput::Synthesis(_) => validate_analysis(raw),
        TaskInput::Newsletter(_) => validate_newsletter(raw),
        TaskInput::Untyped { .. } => Ok(TaskOutput::Untyped(raw.clone())),
    }
}

fn validate_analysis(raw: &Value) -> Result<TaskOutput, ValidationError> {
    let mut reader = FieldReader::new(raw);
    let partial = PartialAnalysis {
        thesis: reader.text("thesis"),
        evidence: reader.text("evidence"),
        counter_argument: reader.text("counter_argument"),
        prediction: reader.text("prediction"),
        builder_implications: reader.text("builder_implications"),
        sources_used: reader.optional_list("sources_used"),
    };

    if !reader.errors.is_empty() {
        return Err(ValidationError {
            partial: PartialOutput::Analysis(partial),
            fields: reader.errors,
        });
    }

    // All required fields are Some once no errors were recorded.
    match partial {
        PartialAnalysis {
            thesis: Some(thesis),
            evidence: Some(evidence),
            counter_argument: Some(counter_argument),
            prediction: Some(prediction),
            builder_implications: Some(builder_implications),
            sources_used,
        } => Ok(TaskOutput::Analysis(AnalysisOutput {
            thesis,
            evidence,
            counter_argument,
            prediction,
            builder_implications,
            sources_used: sources_used.unwrap_or_default(),
        })),
        partial => Err(ValidationError {
            partial: PartialOutput::Analysis(partial),
            fields: Vec::new(),
        }),
    }
}

fn validate_newsletter(raw: &Value) -> Result<TaskOutput, ValidationError> {
    let mut reader = FieldReader::new(raw);
    let partial = PartialNewsletter {
        subject: reader.text("subject"),
        content: reader.text("content"),
    };

    match (&partial.subject, &partial.content) {
        (Some(subject), Some(content)) if reader.errors.is_empty() => {
            Ok(TaskOutput::Newsletter(NewsletterOutput {
                subject: subject.clone(),
                content: content.clone(),
            }))
        }
        _ => Err(ValidationError {
            partial: PartialOutput::Newsletter(partial),
            fields: reader.errors,
        }),
    }
}

/// Pulls fields out of a JSON object, recording every problem it meets.
struct FieldReader<'a> {
    obj: Option<&'a Map<String, Value>>,
    errors: Vec<FieldError>,
}

impl<'a> FieldReader<'a> {
    fn new(raw: &'a Value) -> Self {
        Self {
            obj: raw.as_object(),
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, field: &'static str, problem: FieldProblem) {
        self.errors.push(FieldError { field, problem });
    }

    /// Required non-blank string.
    fn text(&mut self, field: &'static str) -> Option<String> {
        match self.obj.and_then(|o| o.get(field)) {
            None | Some(Value::Null) => {
                self.fail(field, FieldProblem::Missing);
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                self.fail(field, FieldProblem::Empty);
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.fail(field, FieldProblem::WrongType);
                None
            }
        }
    }

    /// Optional list of strings. Absent is fine; present must be well-typed.
    fn optional_list(&mut self, field: &'static str) -> Option<Vec<String>> {
        match self.obj.and_then(|o| o.get(field)) {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect();
                if strings.is_none() {
                    self.fail(field, FieldProblem::WrongType);
                }
                strings
            }
            Some(_) => {
                self.fail(field, FieldProblem::WrongType);
                None
            }
        }
    }
}
