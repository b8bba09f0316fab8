//! Dashboard rollups computed from page aggregates and the raw view log.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::models::deck::Deck;
use crate::models::page_aggregate::PageAggregate;
use crate::models::tier::RetentionTier;
use crate::models::view_event::RawViewEvent;

pub const DAILY_WINDOW_DAYS: u64 = 7;
const RECENT_VIEWERS_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TotalStats {
    pub total_views: i64,
    pub total_time_seconds: f64,
    /// Distinct visitors per deck, summed over decks
    pub unique_visitors: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopDeck {
    pub deck_id: String,
    pub title: String,
    pub visitors: u64,
    pub total_views: i64,
    pub total_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyMetrics {
    pub labels: Vec<String>,
    pub visits: Vec<u64>,
    pub time_spent: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageStat {
    pub page_number: u32,
    pub views: i64,
    pub time_seconds: f64,
    pub average_seconds: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeckStats {
    pub deck_id: String,
    pub title: String,
    pub page_count: u32,
    pub tier: RetentionTier,
    pub retention_days: i64,
    pub total_views: i64,
    pub total_time_seconds: f64,
    pub pages: Vec<PageStat>,
    pub recent_visitors: u64,
    pub recent_viewers: Vec<String>,
}

/// Distinct visitors per deck. A visitor seen on two decks counts twice.
fn visitors_per_deck(views: &[RawViewEvent]) -> HashMap<&str, HashSet<&str>> {
    let mut per_deck: HashMap<&str, HashSet<&str>> = HashMap::new();
    for view in views {
        per_deck
            .entry(view.deck_id.as_str())
            .or_default()
            .insert(view.visitor_id.as_str());
    }
    per_deck
}

pub fn compute_totals(aggregates: &[PageAggregate], views: &[RawViewEvent]) -> TotalStats {
    let unique_visitors = visitors_per_deck(views)
        .values()
        .map(|visitors| visitors.len() as u64)
        .sum();

    TotalStats {
        total_views: aggregates.iter().map(|a| a.total_views).sum(),
        total_time_seconds: aggregates.iter().map(|a| a.total_time_seconds).sum(),
        unique_visitors,
    }
}

/// Rank `decks` by distinct visitors, most first. Ties keep the order of `decks`.
pub fn rank_top_decks(
    decks: &[Deck],
    aggregates: &[PageAggregate],
    views: &[RawViewEvent],
    limit: usize,
) -> Vec<TopDeck> {
    let visitors = visitors_per_deck(views);

    let mut ranked: Vec<TopDeck> = decks
        .iter()
        .map(|deck| {
            let pages = aggregates.iter().filter(|a| a.deck_id == deck.deck_id);
            let (total_views, total_time_seconds) = pages.fold((0, 0.0), |(v, t), a| {
                (v + a.total_views, t + a.total_time_seconds)
            });
            TopDeck {
                deck_id: deck.deck_id.clone(),
                title: deck.title.clone(),
                visitors: visitors
                    .get(deck.deck_id.as_str())
                    .map_or(0, |set| set.len() as u64),
                total_views,
                total_time_seconds,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.visitors.cmp(&a.visitors));
    ranked.truncate(limit);
    ranked
}

/// First day of the daily window that ends on `today`.
pub fn daily_window_start(today: NaiveDate) -> NaiveDate {
    today - Days::new(DAILY_WINDOW_DAYS - 1)
}

/// Epoch millis of midnight UTC at the start of the daily window.
pub fn daily_window_since(today: NaiveDate) -> i64 {
    daily_window_start(today)
        .and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp_millis()
}

/// Seven zero-filled UTC day buckets ending on `today`.
pub fn daily_metrics(views: &[RawViewEvent], today: NaiveDate) -> DailyMetrics {
    let start = daily_window_start(today);
    let days = DAILY_WINDOW_DAYS as usize;

    let labels = (0..DAILY_WINDOW_DAYS)
        .map(|offset| (start + Days::new(offset)).format("%a").to_string())
        .collect();
    let mut visitors: Vec<HashSet<(&str, &str)>> = vec![HashSet::new(); days];
    let mut time_spent = vec![0.0; days];

    for view in views {
        let Some(viewed_at) = DateTime::<Utc>::from_timestamp_millis(view.viewed_at) else {
            continue;
        };
        let offset = (viewed_at.date_naive() - start).num_days();
        if !(0..days as i64).contains(&offset) {
            continue;
        }
        let bucket = offset as usize;
        visitors[bucket].insert((view.visitor_id.as_str(), view.deck_id.as_str()));
        time_spent[bucket] += view.time_spent;
    }

    DailyMetrics {
        labels,
        visits: visitors.iter().map(|set| set.len() as u64).collect(),
        time_spent,
    }
}

/// Per-page counters for `deck`, zero-filled up to its page count.
pub fn deck_stats(
    deck: &Deck,
    tier: RetentionTier,
    aggregates: &[PageAggregate],
    recent_views: &[RawViewEvent],
) -> DeckStats {
    let by_page: HashMap<u32, &PageAggregate> = aggregates
        .iter()
        .filter(|a| a.deck_id == deck.deck_id)
        .map(|a| (a.page_number, a))
        .collect();
    let last_page = by_page
        .keys()
        .copied()
        .max()
        .unwrap_or(0)
        .max(deck.page_count);

    let pages: Vec<PageStat> = (1..=last_page)
        .map(|page_number| {
            let (views, time_seconds) = by_page
                .get(&page_number)
                .map_or((0, 0.0), |a| (a.total_views, a.total_time_seconds));
            PageStat {
                page_number,
                views,
                time_seconds,
                average_seconds: if views > 0 {
                    time_seconds / views as f64
                } else {
                    0.0
                },
            }
        })
        .collect();

    let recent_visitors = recent_views
        .iter()
        .map(|v| v.visitor_id.as_str())
        .collect::<HashSet<_>>()
        .len() as u64;

    let mut recent_viewers: Vec<String> = Vec::new();
    for view in recent_views.iter().rev() {
        if let Some(email) = &view.viewer_email {
            if !recent_viewers.contains(email) {
                recent_viewers.push(email.clone());
            }
        }
        if recent_viewers.len() == RECENT_VIEWERS_LIMIT {
            break;
        }
    }

    DeckStats {
        deck_id: deck.deck_id.clone(),
        title: deck.title.clone(),
        page_count: deck.page_count,
        tier,
        retention_days: tier.retention_days(),
        total_views: pages.iter().map(|p| p.views).sum(),
        total_time_seconds: pages.iter().map(|p| p.time_seconds).sum(),
        pages,
        recent_visitors,
        recent_viewers,
    }
}
