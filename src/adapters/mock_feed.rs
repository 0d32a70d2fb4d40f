//! Generated market data and news standing in for a real provider.
//!
//! Prices follow a geometric random walk seeded from the symbol, so a given
//! (seed, symbol, range) always yields the same bars. News items are seeded
//! per (symbol, day) and carry stable URLs, so refreshing twice stores nothing
//! new.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::domain::error::StockportError;
use crate::domain::news::NewsItem;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::ticker::CompanyInfo;
use crate::ports::quote_source::{NewsSource, QuoteSource};

const TRADING_DAYS: f64 = 252.0;

fn derive_seed(seed: u64, parts: &[&[u8]]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
        hasher.update(&[0]);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes) ^ seed
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Standard normal draw via Box-Muller.
fn standard_normal(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub struct MockQuoteSource {
    seed: u64,
    /// Annualized drift.
    drift: f64,
    /// Annualized volatility.
    volatility: f64,
}

impl MockQuoteSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            drift: 0.08,
            volatility: 0.25,
        }
    }

    pub fn with_dynamics(seed: u64, drift: f64, volatility: f64) -> Self {
        Self {
            seed,
            drift,
            volatility,
        }
    }

    fn start_price(&self, symbol: &str) -> f64 {
        match symbol {
            "AAPL" => 180.0,
            "MSFT" => 350.0,
            _ => 20.0 + (derive_seed(0, &[symbol.as_bytes()]) % 48_000) as f64 / 100.0,
        }
    }

    fn base_volume(symbol: &str) -> f64 {
        match symbol {
            "AAPL" => 50_000_000.0,
            "MSFT" => 30_000_000.0,
            _ => 1_000_000.0 + (derive_seed(1, &[symbol.as_bytes()]) % 9_000_000) as f64,
        }
    }
}

impl QuoteSource for MockQuoteSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, StockportError> {
        if start > end {
            return Ok(Vec::new());
        }
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(self.seed, &[symbol.as_bytes()]));
        let dt = 1.0 / TRADING_DAYS;
        let mu = (self.drift - 0.5 * self.volatility * self.volatility) * dt;
        let sigma = self.volatility * dt.sqrt();
        let base_volume = Self::base_volume(symbol);

        let mut prev_close = self.start_price(symbol);
        let mut bars = Vec::new();
        let mut date = start;
        while date <= end {
            if is_weekday(date) {
                let open = prev_close * (1.0 + 0.002 * standard_normal(&mut rng));
                let close = prev_close * (mu + sigma * standard_normal(&mut rng)).exp();
                let wick_up: f64 = rng.gen_range(0.0..0.01);
                let wick_down: f64 = rng.gen_range(0.0..0.01);
                let high = open.max(close) * (1.0 + wick_up);
                let low = open.min(close) * (1.0 - wick_down);
                let volume = (base_volume * rng.gen_range(0.5..1.5)).round().max(1.0) as i64;

                bars.push(OhlcvBar {
                    symbol: symbol.to_string(),
                    date,
                    open: round2(open),
                    high: round2(high),
                    low: round2(low),
                    close: round2(close),
                    volume,
                });
                prev_close = close;
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        Ok(bars)
    }

    fn company_info(&self, symbol: &str) -> Result<CompanyInfo, StockportError> {
        let (long_name, sector) = match symbol {
            "AAPL" => ("Apple Inc.".to_string(), "Technology"),
            "MSFT" => ("Microsoft Corporation".to_string(), "Technology"),
            other => (format!("{other} Corp."), "Unknown"),
        };
        Ok(CompanyInfo {
            long_name,
            sector: sector.to_string(),
        })
    }
}

struct Template {
    headline: &'static str,
    summary: &'static str,
    publisher: &'static str,
}

const TEMPLATES: [Template; 10] = [
    Template {
        headline: "{name} Reports Strong Q3 Earnings",
        summary: "{name} exceeded expectations with strong sales and services growth.",
        publisher: "MarketWatch",
    },
    Template {
        headline: "{name} Cloud Revenue Grows 25%",
        summary: "{name} cloud services continue showing strong growth momentum.",
        publisher: "Bloomberg",
    },
    Template {
        headline: "{name} Shares Fall After Guidance Miss",
        summary: "Analysts flagged weak demand after {name} cut its outlook.",
        publisher: "Reuters",
    },
    Template {
        headline: "{name} Announces Strategic Partnership",
        summary: "The partnership extends {name} distribution into new regions.",
        publisher: "CNBC",
    },
    Template {
        headline: "{name} Faces Regulation Scrutiny In Europe",
        summary: "Regulators are reviewing {name} practices and shares drop on the news.",
        publisher: "Financial Times",
    },
    Template {
        headline: "{name} Unveils New Product Lineup",
        summary: "{name} expects the product refresh to support profit growth.",
        publisher: "The Verge",
    },
    Template {
        headline: "{name} Completes Acquisition Of Analytics Startup",
        summary: "The acquisition adds engineering talent to {name}.",
        publisher: "Reuters",
    },
    Template {
        headline: "{name} Stock Holds Steady As Market Awaits Data",
        summary: "Trading in {name} was quiet ahead of macro releases.",
        publisher: "Barron's",
    },
    Template {
        headline: "Analysts Downgrade {name} On Weak Margins",
        summary: "A margin decline could weigh on {name} results next quarter.",
        publisher: "Bloomberg",
    },
    Template {
        headline: "{name} Beats Estimates As Shares Rise",
        summary: "Investors cheered as {name} posted a profit beat.",
        publisher: "MarketWatch",
    },
];

fn slugify(text: &str) -> String {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// "Apple Inc." becomes "Apple".
fn short_name(company_name: &str, symbol: &str) -> String {
    company_name
        .split_whitespace()
        .next()
        .filter(|w| !w.is_empty())
        .unwrap_or(symbol)
        .trim_end_matches([',', '.'])
        .to_string()
}

pub struct MockNewsSource {
    seed: u64,
}

impl MockNewsSource {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl NewsSource for MockNewsSource {
    fn fetch_news(
        &self,
        symbol: &str,
        company_name: &str,
        as_of: NaiveDateTime,
        count: usize,
    ) -> Result<Vec<NewsItem>, StockportError> {
        let name = short_name(company_name, symbol);
        let mut items = Vec::with_capacity(count);
        for days_back in 0..count {
            let day = as_of.date() - Duration::days(days_back as i64);
            let day_key = day.format("%Y%m%d").to_string();
            let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(
                self.seed,
                &[symbol.as_bytes(), day_key.as_bytes()],
            ));

            let template = &TEMPLATES[rng.gen_range(0..TEMPLATES.len())];
            let published = day
                .and_hms_opt(rng.gen_range(6..20), rng.gen_range(0..60), 0)
                .unwrap_or(as_of)
                .min(as_of);
            let headline = template.headline.replace("{name}", &name);
            let url = format!(
                "https://news.example.com/{}/{day_key}/{}",
                symbol.to_lowercase(),
                slugify(&headline)
            );

            let mut item = NewsItem {
                symbol: symbol.to_string(),
                published_at: published,
                headline,
                publisher: template.publisher.to_string(),
                url,
                summary: template.summary.replace("{name}", &name),
                sentiment: 0.5,
                topic: String::new(),
            };
            item.annotate();
            items.push(item);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn generation_is_deterministic() {
        let source = MockQuoteSource::new(42);
        let a = source.fetch_history("AAPL", d(2024, 1, 1), d(2024, 3, 31)).unwrap();
        let b = source.fetch_history("AAPL", d(2024, 1, 1), d(2024, 3, 31)).unwrap();
        assert_eq!(a, b);

        let other_seed = MockQuoteSource::new(7)
            .fetch_history("AAPL", d(2024, 1, 1), d(2024, 3, 31))
            .unwrap();
        assert_ne!(a, other_seed);
    }

    #[test]
    fn bars_are_consistent_weekdays() {
        let source = MockQuoteSource::new(1);
        for symbol in ["AAPL", "MSFT", "ZZZ"] {
            let bars = source.fetch_history(symbol, d(2024, 1, 1), d(2024, 12, 31)).unwrap();
            assert!(!bars.is_empty());
            for bar in &bars {
                assert!(is_weekday(bar.date));
                assert!(bar.low <= bar.open && bar.low <= bar.close);
                assert!(bar.high >= bar.open && bar.high >= bar.close);
                assert!(bar.volume > 0);
                assert!(bar.close > 0.0);
            }
            assert!(bars.windows(2).all(|w| w[0].date < w[1].date));
        }
    }

    #[test]
    fn known_symbols_start_near_reference_prices() {
        let source = MockQuoteSource::new(3);
        let aapl = source.fetch_history("AAPL", d(2024, 1, 2), d(2024, 1, 2)).unwrap();
        assert!((aapl[0].open - 180.0).abs() < 10.0);
        let msft = source.fetch_history("MSFT", d(2024, 1, 2), d(2024, 1, 2)).unwrap();
        assert!((msft[0].open - 350.0).abs() < 20.0);
    }

    #[test]
    fn weekend_only_range_is_empty() {
        let source = MockQuoteSource::new(3);
        let bars = source.fetch_history("AAPL", d(2024, 1, 6), d(2024, 1, 7)).unwrap();
        assert!(bars.is_empty());
    }

    #[test]
    fn range_ending_at_the_last_date_terminates() {
        let source = MockQuoteSource::new(3);
        let end = NaiveDate::MAX;
        let bars = source.fetch_history("AAPL", end - Duration::days(6), end).unwrap();
        assert!(!bars.is_empty() && bars.len() <= 7);
        assert!(bars.iter().all(|b| b.date <= end));
    }

    #[test]
    fn company_info_fallback() {
        let source = MockQuoteSource::new(0);
        assert_eq!(source.company_info("AAPL").unwrap().long_name, "Apple Inc.");
        let msft = source.company_info("MSFT").unwrap();
        assert_eq!(msft.long_name, "Microsoft Corporation");
        assert_eq!(msft.sector, "Technology");
        let other = source.company_info("NVDA").unwrap();
        assert_eq!(other.long_name, "NVDA Corp.");
        assert_eq!(other.sector, "Unknown");
    }

    #[test]
    fn news_is_stable_and_annotated() {
        let source = MockNewsSource::new(9);
        let as_of = d(2024, 6, 14).and_hms_opt(12, 0, 0).unwrap();
        let items = source.fetch_news("AAPL", "Apple Inc.", as_of, 5).unwrap();
        assert_eq!(items.len(), 5);
        for item in &items {
            assert!(item.published_at <= as_of);
            assert!(item.url.contains("/aapl/"));
            assert!(item.headline.contains("Apple"));
            assert!(!item.topic.is_empty());
            assert!([0.3, 0.5, 0.7].contains(&item.sentiment));
        }

        // A later refresh regenerates overlapping days with the same URLs.
        let next_day = as_of + Duration::days(1);
        let later = source.fetch_news("AAPL", "Apple Inc.", next_day, 5).unwrap();
        let overlap = later.iter().filter(|l| items.iter().any(|i| i.url == l.url)).count();
        assert_eq!(overlap, 4);
    }

    #[test]
    fn short_name_strips_suffix() {
        assert_eq!(short_name("Apple Inc.", "AAPL"), "Apple");
        assert_eq!(short_name("", "ZZZ"), "ZZZ");
    }
}
