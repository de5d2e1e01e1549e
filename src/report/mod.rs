//! Narrative report synthesis and console formatting.

use askama::Template;
use tracing::info;

use crate::config::ModelsConfig;
use crate::detect::AnomalyRecord;
use crate::evidence::ResearchedAnomaly;
use crate::genai::{CollaboratorError, GeminiClient};
use crate::handoff::to_pretty_json;

/// Turns a finished prompt into one formatted document.
#[async_trait::async_trait]
pub trait NarrativeSynthesizer: Send + Sync {
    async fn synthesize(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

pub struct GeminiSynthesizer {
    client: GeminiClient,
}

impl GeminiSynthesizer {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn from_config(cfg: &ModelsConfig) -> Result<Self, CollaboratorError> {
        Ok(Self::new(GeminiClient::from_env(&cfg.synthesis_model, cfg)?))
    }
}

#[async_trait::async_trait]
impl NarrativeSynthesizer for GeminiSynthesizer {
    async fn synthesize(&self, prompt: &str) -> Result<String, CollaboratorError> {
        info!(model = %self.client.model(), "Generating final report");
        self.client.generate(prompt, false).await
    }
}

/// Analyst instructions wrapped around the researched anomalies.
#[derive(Template)]
#[template(path = "synthesis_prompt.txt", escape = "none")]
pub struct SynthesisPrompt {
    pub subject: String,
    pub platform: String,
    pub anomalies_json: String,
}

impl SynthesisPrompt {
    pub fn new(researched: &[ResearchedAnomaly]) -> Result<Self, serde_json::Error> {
        let json = to_pretty_json(&researched)?;
        Ok(Self {
            subject: join_distinct(researched.iter().map(|r| r.anomaly.artist_name.as_str()), "the artist"),
            platform: join_distinct(researched.iter().map(|r| r.anomaly.platform.as_str()), "the platform"),
            anomalies_json: String::from_utf8_lossy(&json).into_owned(),
        })
    }
}

/// Distinct values in first-seen order, joined with " & ".
fn join_distinct<'a>(values: impl Iterator<Item = &'a str>, fallback: &str) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for v in values.filter(|v| !v.is_empty()) {
        if !seen.contains(&v) {
            seen.push(v);
        }
    }
    if seen.is_empty() {
        fallback.to_string()
    } else {
        seen.join(" & ")
    }
}

/// One-line human summary of a spike.
pub fn format_anomaly_line(rec: &AnomalyRecord) -> String {
    format!(
        "On {}, '{}' in {} spiked to {} views (Avg: {})",
        rec.date,
        rec.track_name,
        rec.country,
        group_thousands(&rec.views.to_string()),
        format_decimal(rec.local_average),
    )
}

fn format_decimal(value: f64) -> String {
    let text = value.to_string();
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{}", group_thousands(int), frac),
        None => group_thousands(&text),
    }
}

/// Insert `,` every three digits of an integer string.
fn group_thousands(int: &str) -> String {
    let (sign, digits) = match int.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("{}{}", sign, out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::evidence::tests::anomaly;

    /// Echoes the prompt length, or fails on demand.
    pub(crate) struct FakeSynthesizer {
        pub fail: bool,
    }

    #[async_trait::async_trait]
    impl NarrativeSynthesizer for FakeSynthesizer {
        async fn synthesize(&self, prompt: &str) -> Result<String, CollaboratorError> {
            if self.fail {
                return Err(CollaboratorError::Api {
                    status: 400,
                    body: "bad request".to_string(),
                });
            }
            Ok(format!("# Report\n\nprompt was {} bytes", prompt.len()))
        }
    }

    #[test]
    fn test_prompt_renders_data_and_subject() {
        let researched = vec![ResearchedAnomaly {
            anomaly: anomaly("Neon Rider", "USA"),
            research_summary: "Fourth of July videos.".to_string(),
        }];

        let prompt = SynthesisPrompt::new(&researched).unwrap().render().unwrap();

        assert!(prompt.contains("Analysis of Engagement Anomalies for Synthwave Surfer"));
        assert!(prompt.contains("tracks on YouTube Shorts"));
        assert!(prompt.contains("\"research_summary\": \"Fourth of July videos.\""));
        assert!(prompt.contains("Confidence Score"));
        assert!(prompt.contains("Markdown"));
    }

    #[test]
    fn test_prompt_does_not_escape_quotes() {
        let researched = vec![ResearchedAnomaly {
            anomaly: anomaly("Rock & \"Roll\"", "US"),
            research_summary: "<none>".to_string(),
        }];
        let prompt = SynthesisPrompt::new(&researched).unwrap().render().unwrap();
        assert!(prompt.contains("<none>"));
        assert!(prompt.contains("Rock & \\\"Roll\\\""));
    }

    #[test]
    fn test_join_distinct() {
        assert_eq!(join_distinct(["A", "B", "A"].into_iter(), "x"), "A & B");
        assert_eq!(join_distinct(std::iter::empty(), "x"), "x");
    }

    #[test]
    fn test_format_anomaly_line() {
        let mut rec = anomaly("Neon Rider", "US");
        rec.views = 1234567;
        rec.local_average = 12345.5;
        assert_eq!(
            format_anomaly_line(&rec),
            "On 2025-07-04, 'Neon Rider' in US spiked to 1,234,567 views (Avg: 12,345.5)"
        );
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("0"), "0");
        assert_eq!(group_thousands("999"), "999");
        assert_eq!(group_thousands("1000"), "1,000");
        assert_eq!(group_thousands("-1234567"), "-1,234,567");
        assert_eq!(format_decimal(107.5), "107.5");
        assert_eq!(format_decimal(2000.0), "2,000");
    }
}
