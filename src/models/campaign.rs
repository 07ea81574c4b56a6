use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub status: CampaignStatus,
    pub prompt_id: Option<i64>,
    pub language: String,
    pub schedule_start: Option<NaiveTime>,
    pub schedule_end: Option<NaiveTime>,
    /// Comma-separated weekday numbers, 0 = Sunday. None means Mon-Fri.
    pub schedule_days: Option<String>,
    pub max_concurrent: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// True when the given local time falls inside the campaign dialing
    /// window. Campaigns without a schedule are always inside the window.
    pub fn within_window(&self, weekday: Weekday, time: NaiveTime) -> bool {
        let (start, end) = match (self.schedule_start, self.schedule_end) {
            (Some(s), Some(e)) => (s, e),
            _ => return true,
        };

        let day = weekday.num_days_from_sunday();
        let days: Vec<u32> = self
            .schedule_days
            .as_deref()
            .map(|d| d.split(',').filter_map(|n| n.trim().parse().ok()).collect())
            .unwrap_or_else(|| vec![1, 2, 3, 4, 5]);

        days.contains(&day) && time >= start && time <= end
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "campaign_status", rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Stopped,
    Completed,
}

/// Campaign row with aggregate lead/call counts for the dashboard list.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CampaignOverview {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub campaign: Campaign,
    pub total_leads: i64,
    pub pending_leads: i64,
    pub completed_calls: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub prompt_id: Option<i64>,
    pub language: Option<String>,
    pub schedule_start: Option<NaiveTime>,
    pub schedule_end: Option<NaiveTime>,
    pub schedule_days: Option<String>,
    pub max_concurrent: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign_with_window(start: &str, end: &str, days: Option<&str>) -> Campaign {
        Campaign {
            id: 1,
            name: "test".into(),
            status: CampaignStatus::Active,
            prompt_id: None,
            language: "de-DE".into(),
            schedule_start: Some(start.parse().unwrap()),
            schedule_end: Some(end.parse().unwrap()),
            schedule_days: days.map(String::from),
            max_concurrent: 5,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn window_defaults_to_weekdays() {
        let c = campaign_with_window("09:00:00", "18:00:00", None);
        assert!(c.within_window(Weekday::Mon, "10:00:00".parse().unwrap()));
        assert!(!c.within_window(Weekday::Sun, "10:00:00".parse().unwrap()));
        assert!(!c.within_window(Weekday::Mon, "20:00:00".parse().unwrap()));
    }

    #[test]
    fn explicit_day_list_is_honored() {
        let c = campaign_with_window("09:00:00", "18:00:00", Some("0,6"));
        assert!(c.within_window(Weekday::Sun, "12:00:00".parse().unwrap()));
        assert!(c.within_window(Weekday::Sat, "12:00:00".parse().unwrap()));
        assert!(!c.within_window(Weekday::Wed, "12:00:00".parse().unwrap()));
    }

    #[test]
    fn unscheduled_campaign_is_always_in_window() {
        let mut c = campaign_with_window("09:00:00", "18:00:00", None);
        c.schedule_start = None;
        c.schedule_end = None;
        assert!(c.within_window(Weekday::Sun, "03:00:00".parse().unwrap()));
    }
}
