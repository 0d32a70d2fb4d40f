//! News items, lexicon sentiment, topic tagging and ticker mentions.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::ticker::TickerRecord;

const POSITIVE_WORDS: [&str; 10] = [
    "gain",
    "up",
    "rise",
    "bull",
    "positive",
    "growth",
    "profit",
    "strong",
    "beat",
    "outperform",
];

const NEGATIVE_WORDS: [&str; 10] = [
    "loss",
    "down",
    "fall",
    "bear",
    "negative",
    "decline",
    "drop",
    "weak",
    "miss",
    "underperform",
];

pub const TOPICS: [&str; 8] = [
    "earnings",
    "acquisition",
    "partnership",
    "regulation",
    "product",
    "market",
    "revenue",
    "growth",
];

pub const GENERAL_TOPIC: &str = "general";

/// Upper-case words that look like symbols but almost never are.
const SYMBOL_BLACKLIST: [&str; 40] = [
    "THE", "AND", "FOR", "ARE", "BUT", "NOT", "YOU", "ALL", "CAN", "HER", "WAS", "ONE", "OUR",
    "HAD", "DAY", "GET", "USE", "MAN", "NEW", "NOW", "OLD", "SEE", "HIM", "TWO", "HOW", "ITS",
    "WHO", "OIL", "SIT", "SET", "USA", "CEO", "CFO", "CTO", "IPO", "SEC", "FDA", "FBI", "CIA",
    "NSA",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsItem {
    pub symbol: String,
    pub published_at: NaiveDateTime,
    pub headline: String,
    pub publisher: String,
    pub url: String,
    pub summary: String,
    pub sentiment: f64,
    pub topic: String,
}

impl NewsItem {
    pub fn date(&self) -> NaiveDate {
        self.published_at.date()
    }

    pub fn label(&self) -> SentimentLabel {
        SentimentLabel::from_score(self.sentiment)
    }

    /// Scores sentiment and topic from the headline and summary.
    pub fn annotate(&mut self) {
        let text = format!("{} {}", self.headline, self.summary);
        self.sentiment = score_sentiment(&text);
        self.topic = classify_topic(&text).to_string();
    }
}

/// Hex blake3 digest used as the deduplication key for stored items.
pub fn url_hash(url: &str) -> String {
    blake3::hash(url.trim().as_bytes()).to_hex().to_string()
}

/// 0.7 when more positive words than negative ones occur in the text, 0.3
/// for the reverse, otherwise 0.5. Each lexicon word counts once, wherever
/// it appears, so inflections such as "rises" or "losses" match.
pub fn score_sentiment(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(**w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(**w)).count();
    if positive > negative {
        0.7
    } else if negative > positive {
        0.3
    } else {
        0.5
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > 0.6 {
            SentimentLabel::Positive
        } else if score < 0.4 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Neutral => "Neutral",
            SentimentLabel::Negative => "Negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First topic keyword contained in `text`, else "general".
pub fn classify_topic(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    TOPICS
        .iter()
        .find(|t| lower.contains(**t))
        .copied()
        .unwrap_or(GENERAL_TOPIC)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentPoint {
    pub symbol: String,
    pub date: NaiveDate,
    pub mean_sentiment: f64,
    pub articles: usize,
}

/// Mean sentiment per (symbol, day), ordered by symbol then date.
pub fn sentiment_trend(items: &[NewsItem], symbol: Option<&str>) -> Vec<SentimentPoint> {
    let mut groups: BTreeMap<(&str, NaiveDate), (f64, usize)> = BTreeMap::new();
    for item in items {
        if symbol.is_some_and(|s| s != item.symbol) {
            continue;
        }
        let entry = groups
            .entry((item.symbol.as_str(), item.date()))
            .or_insert((0.0, 0));
        entry.0 += item.sentiment;
        entry.1 += 1;
    }
    groups
        .into_iter()
        .map(|((symbol, date), (sum, count))| SentimentPoint {
            symbol: symbol.to_string(),
            date,
            mean_sentiment: sum / count as f64,
            articles: count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicCount {
    pub topic: String,
    pub frequency: usize,
}

/// Occurrences of each topic keyword across all headlines, most frequent
/// first, at most `n`. Topics that never occur are omitted.
pub fn extract_topics(items: &[NewsItem], n: usize) -> Vec<TopicCount> {
    let headlines = items
        .iter()
        .map(|i| i.headline.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let mut topics: Vec<TopicCount> = TOPICS
        .iter()
        .map(|t| TopicCount {
            topic: t.to_string(),
            frequency: headlines.matches(t).count(),
        })
        .filter(|t| t.frequency > 0)
        .collect();
    // Stable sort keeps keyword order among ties.
    topics.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    topics.truncate(n);
    topics
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentSummary {
    pub symbol: String,
    pub articles: usize,
    pub mean_sentiment: f64,
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentSummary {
    pub fn label(&self) -> SentimentLabel {
        SentimentLabel::from_score(self.mean_sentiment)
    }
}

pub fn sentiment_summary(items: &[NewsItem]) -> Vec<SentimentSummary> {
    let mut groups: BTreeMap<&str, Vec<&NewsItem>> = BTreeMap::new();
    for item in items {
        groups.entry(item.symbol.as_str()).or_default().push(item);
    }
    groups
        .into_iter()
        .map(|(symbol, items)| {
            let count_label =
                |label: SentimentLabel| items.iter().filter(|i| i.label() == label).count();
            SentimentSummary {
                symbol: symbol.to_string(),
                articles: items.len(),
                mean_sentiment: items.iter().map(|i| i.sentiment).sum::<f64>() / items.len() as f64,
                positive: count_label(SentimentLabel::Positive),
                neutral: count_label(SentimentLabel::Neutral),
                negative: count_label(SentimentLabel::Negative),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchMethod {
    Cashtag,
    CompanyName,
    Alias,
    Symbol,
}

impl MatchMethod {
    pub fn confidence(&self) -> f64 {
        match self {
            MatchMethod::Cashtag => 1.0,
            MatchMethod::CompanyName => 0.9,
            MatchMethod::Alias => 0.8,
            MatchMethod::Symbol => 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerMatch {
    pub symbol: String,
    /// Highest confidence among the methods that matched.
    pub confidence: f64,
    pub method: MatchMethod,
    pub mentions: usize,
}

/// Whole-word, case-insensitive occurrences of `phrase` in `lower_text`.
fn count_phrase(lower_text: &str, phrase: &str) -> usize {
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return 0;
    }
    let is_word = |c: Option<char>| c.is_some_and(char::is_alphanumeric);
    lower_text
        .match_indices(&phrase)
        .filter(|(start, _)| {
            let before = lower_text[..*start].chars().next_back();
            let after = lower_text[start + phrase.len()..].chars().next();
            !is_word(before) && !is_word(after)
        })
        .count()
}

/// Finds mentions of known tickers by cashtag, company name, alias or bare
/// upper-case symbol. Results are sorted by confidence, then symbol.
pub fn tag_tickers(text: &str, tickers: &[TickerRecord]) -> Vec<TickerMatch> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '$' || c == '.' || c == '-'))
        .map(|w| w.trim_end_matches(['.', '-']))
        .filter(|w| !w.is_empty())
        .collect();

    let mut matches = Vec::new();
    for ticker in tickers {
        let mut found: Vec<(MatchMethod, usize)> = Vec::new();

        let cashtags = words
            .iter()
            .filter(|w| {
                w.strip_prefix('$')
                    .is_some_and(|s| s.eq_ignore_ascii_case(&ticker.symbol))
            })
            .count();
        found.push((MatchMethod::Cashtag, cashtags));

        if ticker.company_name.len() > 3 {
            found.push((
                MatchMethod::CompanyName,
                count_phrase(&lower, &ticker.company_name),
            ));
        }

        let aliases = ticker
            .aliases
            .iter()
            .filter(|a| a.len() > 1)
            .map(|a| count_phrase(&lower, a))
            .sum();
        found.push((MatchMethod::Alias, aliases));

        if !SYMBOL_BLACKLIST.contains(&ticker.symbol.as_str()) {
            let bare = words.iter().filter(|w| **w == ticker.symbol).count();
            found.push((MatchMethod::Symbol, bare));
        }

        let mentions: usize = found.iter().map(|(_, n)| n).sum();
        if mentions == 0 {
            continue;
        }
        let Some(method) = found
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(m, _)| *m)
            .max_by(|a, b| a.confidence().total_cmp(&b.confidence()))
        else {
            continue;
        };
        matches.push(TickerMatch {
            symbol: ticker.symbol.clone(),
            confidence: method.confidence(),
            method,
            mentions,
        });
    }

    matches.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    matches
}
