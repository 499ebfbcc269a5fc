//! Multi-strategy content classification.
//!
//! Three scoring passes (keyword frequency, line-level structure, content
//! patterns) are combined into one score per category. The winner is returned
//! immediately when it clears the confidence threshold — the common, cheap
//! path. Below threshold a single generative-model request verifies the
//! label, degrading back to the heuristic winner on timeout, error, or an
//! unmappable reply. No text is ever left unclassified.
//!
//! The taxonomy is an injected, ordered value rather than a process-wide
//! table, so tests can run with alternate category sets and tie-breaks are
//! deterministic (first declared wins).

use std::collections::HashMap;

use regex::Regex;
use tracing::{debug, info};

use crate::llm::{GenerateOptions, LlmClient};

/// One category with its curated keyword lists. Strong terms count double.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub name: String,
    pub strong: Vec<&'static str>,
    pub weak: Vec<&'static str>,
}

impl CategoryRule {
    fn new(name: &str, strong: Vec<&'static str>, weak: Vec<&'static str>) -> Self {
        Self {
            name: name.to_string(),
            strong,
            weak,
        }
    }
}

/// The default category table. Order matters: ties resolve to the first
/// entry, and "Other" is last so it only wins when nothing scores.
pub fn default_taxonomy() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "Code",
            vec![
                "def ", "class ", "function", "import ", "return", "algorithm",
                "implementation", "variable", "loop", "array", "object", "method",
                "module", "package", "library", "syntax", "compile", "debug",
                "exception", "interface",
            ],
            vec!["programming", "developer", "code", "software", "technical"],
        ),
        CategoryRule::new(
            "Documentation",
            vec![
                "## ", "# ", "api", "endpoint", "rest", "http", "json", "schema",
                "response", "parameter", "authentication", "authorization", "oauth",
                "guide", "tutorial", "usage", "example", "reference", "specification",
                "documentation",
            ],
            vec!["help", "explain", "describe", "design", "architecture", "pattern"],
        ),
        CategoryRule::new(
            "Education",
            vec![
                "question", "answer", "quiz", "exercise", "test", "exam", "learning",
                "course", "lesson", "assignment", "homework", "solution", "evaluate",
                "understand", "concept", "theory", "principle",
            ],
            vec!["teaching", "study", "student", "educational", "learn"],
        ),
        CategoryRule::new(
            "Technology",
            vec![
                "ai", "ml", "machine learning", "neural", "data", "cloud",
                "deployment", "kubernetes", "docker", "devops", "infrastructure",
                "framework", "tool", "platform", "innovation", "technology", "system",
                "performance", "optimization",
            ],
            vec!["tech", "tools", "systems", "software"],
        ),
        CategoryRule::new(
            "Business",
            vec![
                "business", "strategy", "marketing", "sales", "revenue", "profit",
                "customer", "market", "growth", "operations", "management",
                "leadership", "roi", "financial", "investment", "enterprise",
                "organization",
            ],
            vec!["company", "work", "plan", "goal", "objective"],
        ),
        CategoryRule::new("Other", vec![], vec![]),
    ]
}

/// A compiled content-pattern detector: regex hit adds `bonus` to `category`.
struct PatternRule {
    regex: Regex,
    category: &'static str,
    bonus: f64,
}

pub struct Classifier {
    taxonomy: Vec<CategoryRule>,
    threshold: f64,
    patterns: Vec<PatternRule>,
}

impl Classifier {
    pub fn new(taxonomy: Vec<CategoryRule>, threshold: f64) -> Self {
        Self {
            taxonomy,
            threshold,
            patterns: compile_patterns(),
        }
    }

    /// Run all three passes and return the winning label with its score.
    pub fn classify_heuristic(&self, text: &str) -> (String, f64) {
        let keyword = self.keyword_scores(text);
        let structure = self.structure_scores(text);
        let content = self.content_scores(text);

        let mut best: Option<(&str, f64)> = None;
        for rule in &self.taxonomy {
            let name = rule.name.as_str();
            let score = keyword.get(name).copied().unwrap_or(0.0)
                + structure.get(name).copied().unwrap_or(0.0) * 1.5
                + content.get(name).copied().unwrap_or(0.0) * 1.5;
            // Strictly-greater keeps the first declared category on ties.
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((name, score));
            }
        }

        let (name, score) = best.unwrap_or(("Other", 0.0));
        debug!(category = name, score, "heuristic classification");
        (name.to_string(), score)
    }

    /// Classify text, escalating to the generative model only below the
    /// confidence threshold. Always returns a label.
    pub async fn classify(&self, llm: &LlmClient, text: &str) -> String {
        let (winner, score) = self.classify_heuristic(text);

        if score > self.threshold {
            info!(category = %winner, score, "classified without model fallback");
            return winner;
        }

        if !llm.is_enabled() {
            return winner;
        }

        match self.verify_with_model(llm, text).await {
            Some(label) => {
                info!(category = %label, "model-verified classification");
                label
            }
            None => {
                info!(category = %winner, score, "model unclear, keeping heuristic winner");
                winner
            }
        }
    }

    async fn verify_with_model(&self, llm: &LlmClient, text: &str) -> Option<String> {
        let excerpt: String = text.chars().take(800).collect();
        let categories: Vec<&str> = self.taxonomy.iter().map(|r| r.name.as_str()).collect();
        let prompt = format!(
            "You are a document classifier. Classify into ONE category:\n\n\
             - Code: software code, algorithms, implementations, functions, classes\n\
             - Documentation: API docs, guides, tutorials, references, specifications\n\
             - Education: questions, exercises, tests, courses, learning materials\n\
             - Technology: tech news, tools, infrastructure, cloud, AI/ML, DevOps\n\
             - Business: strategy, operations, sales, marketing, management, ROI\n\
             - Other: doesn't fit above\n\n\
             Respond with ONLY the category name.\n\n\
             Document:\n{}\n\nCategory:",
            excerpt
        );

        let options = GenerateOptions {
            temperature: 0.05,
            max_tokens: 5,
            context_window: 2048,
        };
        let reply = llm.generate(&prompt, &options).await.ok()?;
        let first = reply.trim().to_lowercase();
        let first = first.split_whitespace().next()?;
        map_model_label(first, &categories)
    }

    fn keyword_scores(&self, text: &str) -> HashMap<&str, f64> {
        let lower = text.to_lowercase();
        let mut scores = HashMap::new();
        for rule in &self.taxonomy {
            let mut score = 0.0;
            for term in &rule.strong {
                score += count_occurrences(&lower, term) as f64 * 2.0;
            }
            for term in &rule.weak {
                score += count_occurrences(&lower, term) as f64;
            }
            scores.insert(rule.name.as_str(), score);
        }
        scores
    }

    fn structure_scores(&self, text: &str) -> HashMap<&str, f64> {
        let lines: Vec<&str> = text.lines().collect();
        let total = lines.len().max(1) as f64;
        let mut scores: HashMap<&str, f64> = HashMap::new();

        let headings = lines
            .iter()
            .filter(|l| l.trim_start().starts_with('#'))
            .count();
        if headings > 5 {
            *scores.entry("Documentation").or_default() += 3.0;
        }

        const CODE_TOKENS: [&str; 8] = [
            "def ", "class ", "import ", "function", "return", "if ", "for ", "while ",
        ];
        let code_lines = lines
            .iter()
            .filter(|l| CODE_TOKENS.iter().any(|t| l.contains(t)))
            .count();
        if code_lines as f64 > total * 0.2 {
            *scores.entry("Code").or_default() += 4.0;
        }

        const QA_TOKENS: [&str; 8] = [
            "?", "question:", "answer:", "q:", "a:", "what ", "how ", "why ",
        ];
        let qa_lines = lines
            .iter()
            .filter(|l| {
                let lower = l.to_lowercase();
                QA_TOKENS.iter().any(|t| lower.contains(t))
            })
            .count();
        if qa_lines as f64 > total * 0.15 {
            *scores.entry("Education").or_default() += 3.0;
        }

        if text.contains('{') && text.contains('}') && kv_pair_regex().is_match(text) {
            *scores.entry("Documentation").or_default() += 2.0;
        }

        if text.contains("```") {
            *scores.entry("Code").or_default() += 3.0;
        }

        if text.matches("\n-").count() > 10 {
            *scores.entry("Documentation").or_default() += 2.0;
        }

        scores
    }

    fn content_scores(&self, text: &str) -> HashMap<&str, f64> {
        let lower = text.to_lowercase();
        let mut scores: HashMap<&str, f64> = HashMap::new();
        for pattern in &self.patterns {
            if pattern.regex.is_match(&lower) {
                *scores.entry(pattern.category).or_default() += pattern.bonus;
            }
        }
        scores
    }
}

fn kv_pair_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""[^"]*":\s*"#).expect("static regex"))
}

fn compile_patterns() -> Vec<PatternRule> {
    let table: [(&str, &str, f64); 7] = [
        // REST verb + path
        (r"(get|post|put|delete|patch)\s+(/[a-z/]+)", "Documentation", 3.0),
        // algorithmic complexity vocabulary
        (r"(time complexity|space complexity|o\(|computational)", "Code", 2.0),
        // business KPIs
        (r"(roi|kpi|revenue|profit|market|customer|stakeholder|budget)", "Business", 2.0),
        // ML / training vocabulary
        (r"(neural|training|dataset|tensor|epoch|layer|gradient)", "Technology", 3.0),
        // pedagogy vocabulary
        (r"(chapter|section|quiz|exercise|solution|evaluate|homework)", "Education", 2.0),
        // SQL vocabulary
        (r"(select|insert|update|delete|table|database|schema|query)", "Code", 2.0),
        // config-file vocabulary
        (r"(config|yaml|json|\.env|environment|setting)", "Technology", 1.0),
    ];
    table
        .into_iter()
        .map(|(pattern, category, bonus)| PatternRule {
            regex: Regex::new(pattern).expect("static regex"),
            category,
            bonus,
        })
        .collect()
}

/// Map the model's first token onto a canonical label via the synonym table.
fn map_model_label(token: &str, categories: &[&str]) -> Option<String> {
    let synonyms: [(&str, &str); 14] = [
        ("code", "Code"),
        ("documentation", "Documentation"),
        ("docs", "Documentation"),
        ("api", "Documentation"),
        ("education", "Education"),
        ("educational", "Education"),
        ("learning", "Education"),
        ("questions", "Education"),
        ("technology", "Technology"),
        ("tech", "Technology"),
        ("tools", "Technology"),
        ("business", "Business"),
        ("operations", "Business"),
        ("other", "Other"),
    ];
    for (key, label) in synonyms {
        if token.contains(key) && categories.contains(&label) {
            return Some(label.to_string());
        }
    }
    None
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

// ---- Department / year taxonomy (optional destination subdirectories) ----

/// Keyword-table department detection over filename + text.
pub fn detect_department(text: &str, filename: &str) -> Option<String> {
    const DEPARTMENTS: [(&str, &[&str]); 5] = [
        ("Engineering", &["engineering", "infrastructure", "backend", "frontend"]),
        ("IT", &["information technology", "helpdesk", "it support"]),
        ("Finance", &["finance", "accounting", "budget", "invoice"]),
        ("HR", &["human resources", "hiring", "onboarding", "payroll"]),
        ("Research", &["research", "experiment", "hypothesis", "study"]),
    ];
    let haystack = format!("{} {}", filename.to_lowercase(), text.to_lowercase());
    for (dept, keys) in DEPARTMENTS {
        if keys.iter().any(|k| haystack.contains(k)) {
            return Some(dept.to_string());
        }
    }
    None
}

/// First plausible calendar year mentioned in filename or text.
pub fn detect_year(text: &str, filename: &str) -> Option<String> {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    // Not \b: filenames delimit years with underscores, which are word chars.
    let re = RE.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])(20\d{2})(?:[^0-9]|$)").expect("static regex")
    });
    re.captures(filename)
        .or_else(|| re.captures(text))
        .map(|c| c[1].to_string())
}
