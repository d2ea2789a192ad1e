// ==========================================
// 司机排班调度系统 - 学习得分提供者
// ==========================================
// 职责: 为自动排班提供 ownership / affinity 两类得分 ([0,1])
// 实现:
// - StaticScoreProvider: 外部模型预先计算的得分表
// - HistoricalScoreProvider: 基于历史分配的槽位归属 + 司机作息模式
// ==========================================

use crate::domain::assignment::AssignmentWithSubject;
use crate::domain::driver::Driver;
use crate::domain::subject::AssignmentSubject;
use crate::domain::types::{weekday_name, SoloType};
use chrono::{Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 槽位独占阈值: 单个司机占比达到该值视为 owned
pub const OWNED_SLOT_SHARE: f64 = 0.70;
/// 偏好工作日阈值: 出现频率达到该值的星期视为偏好
pub const PREFERRED_DAY_SHARE: f64 = 0.25;
/// 无历史司机的中性亲和度
pub const NEUTRAL_AFFINITY: f64 = 0.5;

const DAY_MATCH_WEIGHT: f64 = 0.4;
const START_TIME_MATCH_WEIGHT: f64 = 0.3;
const SOLO_TYPE_MATCH_WEIGHT: f64 = 0.3;
const TOP_N: usize = 3;
/// 并列最多次数时按最近 N 周的次数决出胜者
const TIE_BREAK_RECENT_WEEKS: i64 = 8;
/// 并列胜者的得分加成
const TIE_BREAK_BONUS: f64 = 0.01;

// ==========================================
// ScoreProvider Trait
// ==========================================
// 得分为黑盒输入;调用方负责裁剪到 [0,1]
pub trait ScoreProvider: Send + Sync {
    fn ownership_score(&self, driver: &Driver, subject: &AssignmentSubject) -> f64;

    fn affinity_score(&self, driver: &Driver, subject: &AssignmentSubject) -> f64;
}

// ==========================================
// StaticScoreProvider - 预计算得分表
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct StaticScoreProvider {
    scores: HashMap<(String, String), (f64, f64)>,
    default_ownership: f64,
    default_affinity: f64,
}

impl StaticScoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未登记的 (司机, 班次) 使用的默认得分
    pub fn with_defaults(mut self, ownership: f64, affinity: f64) -> Self {
        self.default_ownership = ownership;
        self.default_affinity = affinity;
        self
    }

    pub fn insert(&mut self, driver_id: &str, subject_id: &str, ownership: f64, affinity: f64) {
        self.scores.insert(
            (driver_id.to_string(), subject_id.to_string()),
            (ownership, affinity),
        );
    }

    fn lookup(&self, driver: &Driver, subject: &AssignmentSubject) -> Option<(f64, f64)> {
        self.scores
            .get(&(driver.driver_id.clone(), subject.subject_id.clone()))
            .copied()
    }
}

impl ScoreProvider for StaticScoreProvider {
    fn ownership_score(&self, driver: &Driver, subject: &AssignmentSubject) -> f64 {
        self.lookup(driver, subject)
            .map(|(o, _)| o)
            .unwrap_or(self.default_ownership)
    }

    fn affinity_score(&self, driver: &Driver, subject: &AssignmentSubject) -> f64 {
        self.lookup(driver, subject)
            .map(|(_, a)| a)
            .unwrap_or(self.default_affinity)
    }
}

// ==========================================
// 槽位 (Slot)
// ==========================================
// 槽位 = (班次类型, 牵引车, 开始时刻 HH:MM, 星期)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub solo_type: SoloType,
    pub resource_id: String,
    pub start_time: String,
    pub day: String,
}

impl SlotKey {
    pub fn for_subject(subject: &AssignmentSubject) -> Self {
        Self {
            solo_type: subject.solo_type,
            resource_id: subject.resource_id.clone().unwrap_or_default(),
            start_time: subject.start_time().format("%H:%M").to_string(),
            day: weekday_name(subject.day_of_week()).to_string(),
        }
    }
}

/// 槽位类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotClass {
    Owned,
    Rotating,
    Unknown,
}

/// 槽位历史分布
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDistribution {
    pub slot: SlotKey,
    pub total: usize,
    /// (driver_id, 占比),占比降序
    pub shares: Vec<(String, f64)>,
    pub class: SlotClass,
    pub owner: Option<String>,
}

// ==========================================
// DriverPattern - 司机作息模式
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
struct DriverPattern {
    /// 星期序号(周一 = 0)
    preferred_days: Vec<u32>,
    preferred_start_times: Vec<NaiveTime>,
    primary_solo_type: Option<SoloType>,
}

impl DriverPattern {
    fn from_history(history: &[&AssignmentSubject]) -> Self {
        let total = history.len();
        if total == 0 {
            return Self::default();
        }

        let day_counts = ranked_counts(history.iter().map(|s| day_index(s.day_of_week())));
        let mut preferred_days: Vec<u32> = day_counts
            .iter()
            .filter(|(_, n)| *n as f64 / total as f64 >= PREFERRED_DAY_SHARE)
            .map(|(d, _)| *d)
            .collect();
        if preferred_days.is_empty() {
            preferred_days = day_counts.iter().take(TOP_N).map(|(d, _)| *d).collect();
        }

        let preferred_start_times = ranked_counts(history.iter().map(|s| s.start_time()))
            .into_iter()
            .take(TOP_N)
            .map(|(t, _)| t)
            .collect();

        let primary_solo_type = ranked_counts(history.iter().map(|s| s.solo_type))
            .first()
            .map(|(s, _)| *s);

        Self {
            preferred_days,
            preferred_start_times,
            primary_solo_type,
        }
    }

    fn affinity(&self, subject: &AssignmentSubject) -> f64 {
        let mut score = 0.0;
        if self.preferred_days.contains(&day_index(subject.day_of_week())) {
            score += DAY_MATCH_WEIGHT;
        }
        if self.preferred_start_times.contains(&subject.start_time()) {
            score += START_TIME_MATCH_WEIGHT;
        }
        if self.primary_solo_type == Some(subject.solo_type) {
            score += SOLO_TYPE_MATCH_WEIGHT;
        }
        score
    }
}

fn day_index(day: Weekday) -> u32 {
    day.num_days_from_monday()
}

/// 计数并按 (次数降序, 值升序) 排列,保证结果稳定
fn ranked_counts<T, I>(values: I) -> Vec<(T, usize)>
where
    T: Ord + Copy + std::hash::Hash,
    I: Iterator<Item = T>,
{
    let mut counts: HashMap<T, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    let mut ranked: Vec<(T, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

// ==========================================
// HistoricalScoreProvider - 历史模式得分
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct HistoricalScoreProvider {
    /// 槽位 → (driver_id → 历史服务日期)
    slots: HashMap<SlotKey, HashMap<String, Vec<NaiveDate>>>,
    patterns: HashMap<String, DriverPattern>,
}

impl HistoricalScoreProvider {
    /// 由历史分配构建(通常为目标周之前的分配记录)
    pub fn from_history(history: &[AssignmentWithSubject]) -> Self {
        let mut slots: HashMap<SlotKey, HashMap<String, Vec<NaiveDate>>> = HashMap::new();
        let mut by_driver: HashMap<String, Vec<&AssignmentSubject>> = HashMap::new();

        for aws in history {
            slots
                .entry(SlotKey::for_subject(&aws.subject))
                .or_default()
                .entry(aws.driver_id().to_string())
                .or_default()
                .push(aws.subject.service_date);
            by_driver
                .entry(aws.driver_id().to_string())
                .or_default()
                .push(&aws.subject);
        }

        let patterns = by_driver
            .into_iter()
            .map(|(driver_id, shifts)| (driver_id, DriverPattern::from_history(&shifts)))
            .collect();

        Self { slots, patterns }
    }

    /// 槽位历史分布
    pub fn slot_distribution(&self, subject: &AssignmentSubject) -> SlotDistribution {
        let slot = SlotKey::for_subject(subject);
        let Some(counts) = self.slots.get(&slot) else {
            return SlotDistribution {
                slot,
                total: 0,
                shares: Vec::new(),
                class: SlotClass::Unknown,
                owner: None,
            };
        };

        let total: usize = counts.values().map(Vec::len).sum();
        let mut shares: Vec<(String, f64)> = counts
            .iter()
            .map(|(driver_id, dates)| (driver_id.clone(), dates.len() as f64 / total as f64))
            .collect();
        shares.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let owner = shares
            .first()
            .filter(|(_, share)| *share >= OWNED_SLOT_SHARE)
            .map(|(driver_id, _)| driver_id.clone());
        let class = if owner.is_some() {
            SlotClass::Owned
        } else {
            SlotClass::Rotating
        };

        SlotDistribution {
            slot,
            total,
            shares,
            class,
            owner,
        }
    }

    /// 最多次数并列时的胜者: 截至 `as_of` 最近 8 周次数多者,再按 driver_id
    fn tie_break_winner<'a>(
        counts: &'a HashMap<String, Vec<NaiveDate>>,
        as_of: NaiveDate,
    ) -> Option<&'a str> {
        let max = counts.values().map(Vec::len).max()?;
        let tied: Vec<(&String, &Vec<NaiveDate>)> =
            counts.iter().filter(|(_, dates)| dates.len() == max).collect();
        if tied.len() < 2 {
            return None;
        }

        let cutoff = as_of - Duration::weeks(TIE_BREAK_RECENT_WEEKS);
        tied.into_iter()
            .map(|(driver_id, dates)| {
                let recent = dates.iter().filter(|d| **d >= cutoff && **d <= as_of).count();
                (driver_id.as_str(), recent)
            })
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(driver_id, _)| driver_id)
    }
}

impl ScoreProvider for HistoricalScoreProvider {
    fn ownership_score(&self, driver: &Driver, subject: &AssignmentSubject) -> f64 {
        let Some(counts) = self.slots.get(&SlotKey::for_subject(subject)) else {
            return 0.0;
        };
        let total: usize = counts.values().map(Vec::len).sum();
        if total == 0 {
            return 0.0;
        }
        let share = counts.get(&driver.driver_id).map_or(0, Vec::len) as f64 / total as f64;
        match Self::tie_break_winner(counts, subject.service_date) {
            Some(winner) if winner == driver.driver_id => (share + TIE_BREAK_BONUS).min(1.0),
            _ => share,
        }
    }

    fn affinity_score(&self, driver: &Driver, subject: &AssignmentSubject) -> f64 {
        match self.patterns.get(&driver.driver_id) {
            Some(pattern) => pattern.affinity(subject),
            None => NEUTRAL_AFFINITY,
        }
    }
}
