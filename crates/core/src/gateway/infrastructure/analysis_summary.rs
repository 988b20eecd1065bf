use serde::Deserialize;
use serde_json::Value;

/// Body of a successful `/analyze` response.
#[derive(Debug, Deserialize)]
pub struct AnalyzeResponse {
    pub results: Vec<FaceAnalysis>,
}

/// Per-face attributes returned by `/analyze`. Only the dominant labels
/// are read; the score maps the service also sends are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct FaceAnalysis {
    pub age: Value,
    pub dominant_race: String,
    pub dominant_gender: String,
    pub dominant_emotion: String,
}

impl FaceAnalysis {
    /// e.g. `"31 years old asian Man with happy mood."`
    pub fn summary(&self) -> String {
        format!(
            "{} years old {} {} with {} mood.",
            format_age(&self.age),
            self.dominant_race,
            self.dominant_gender,
            self.dominant_emotion
        )
    }
}

/// Ages come back as integers from most backends but as floats from some.
fn format_age(age: &Value) -> String {
    match age {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 => format!("{f:.0}"),
            (None, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn summarize(response: &AnalyzeResponse) -> Vec<String> {
    response.results.iter().map(FaceAnalysis::summary).collect()
}
