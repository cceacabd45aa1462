//! Turns a score snapshot into human-readable insights, recommendations and
//! next best actions.

use crate::models::{
    ActionTiming, Channel, EngagementSummary, Insight, InsightCategory, InsightType, Lead,
    LeadScore, NextBestAction, Priority,
};
use crate::scoring::is_senior_title;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Days after creation with a sub-60 score before a lead is considered stale.
pub const STALE_AFTER_DAYS: i64 = 30;

fn insight(
    insight_type: InsightType,
    category: InsightCategory,
    title: &str,
    description: String,
    importance: Priority,
    suggested_action: Option<&str>,
) -> Insight {
    Insight {
        id: Uuid::new_v4(),
        insight_type,
        category,
        title: title.to_string(),
        description,
        importance,
        actionable: suggested_action.is_some(),
        suggested_action: suggested_action.map(str::to_string),
    }
}

/// Evaluates the insight rule table. `history` covers every known event for
/// the lead. Output is ordered by importance, rule order within a level.
pub fn generate_insights(
    score: &LeadScore,
    lead: &Lead,
    history: &EngagementSummary,
    now: DateTime<Utc>,
) -> Vec<Insight> {
    let total = score.total_score();
    let engagement = score.engagement_score();
    let fit = score.fit_score();
    let flags = score.flags();
    let mut insights = Vec::new();

    if total >= 80 {
        insights.push(insight(
            InsightType::Positive,
            InsightCategory::Score,
            "Hot Lead",
            format!("Score of {} puts this lead in the top tier", total),
            Priority::High,
            Some("Schedule immediate outreach"),
        ));
    } else if flags.is_qualified() {
        insights.push(insight(
            InsightType::Opportunity,
            InsightCategory::Score,
            "Qualified Lead",
            format!("Score of {} with fit {} meets qualification", total, fit),
            Priority::Medium,
            Some("Move to a sales-ready sequence"),
        ));
    }

    if total < 40 {
        insights.push(insight(
            InsightType::Warning,
            InsightCategory::Score,
            "Low Score",
            format!("Score of {} indicates low readiness", total),
            Priority::Medium,
            Some("Enroll in a long-term nurture sequence"),
        ));
    } else if engagement < 50 {
        insights.push(insight(
            InsightType::Warning,
            InsightCategory::Engagement,
            "Requires Nurturing",
            format!("Engagement score of {} is below the nurture threshold", engagement),
            Priority::Medium,
            Some("Enroll in a long-term nurture sequence"),
        ));
    }

    if engagement < 50 && history.total >= 5 && history.opens == 0 {
        insights.push(insight(
            InsightType::Negative,
            InsightCategory::Engagement,
            "Email Fatigue",
            format!(
                "{} emails tracked without a single open",
                history.total
            ),
            Priority::High,
            Some("Switch channel to LinkedIn or phone"),
        ));
    }

    if history.replies > 0 {
        insights.push(insight(
            InsightType::Positive,
            InsightCategory::Engagement,
            "Active Conversation",
            format!("Lead has replied {} time(s)", history.replies),
            Priority::High,
            Some("Respond promptly and propose a meeting"),
        ));
    }

    if flags.is_engaged() {
        insights.push(insight(
            InsightType::Positive,
            InsightCategory::Engagement,
            "Highly Engaged",
            format!("Engagement score of {} over the last 30 days", engagement),
            Priority::Medium,
            None,
        ));
    }

    if lead.title().is_some_and(is_senior_title) && !lead.has_phone() && !lead.has_social_url() {
        insights.push(insight(
            InsightType::Neutral,
            InsightCategory::Profile,
            "Limited Contact Information",
            "Senior contact reachable by email only".to_string(),
            Priority::Medium,
            Some("Enrich phone and social profile data"),
        ));
    }

    if fit >= 70 {
        insights.push(insight(
            InsightType::Opportunity,
            InsightCategory::Profile,
            "Strong ICP Fit",
            format!("Fit score of {} matches the ideal customer profile", fit),
            Priority::Medium,
            None,
        ));
    } else if fit < 50 {
        insights.push(insight(
            InsightType::Warning,
            InsightCategory::Profile,
            "Poor Fit",
            format!("Fit score of {} is outside the ideal customer profile", fit),
            Priority::Low,
            Some("Verify the lead matches the ideal customer profile"),
        ));
    }

    let age_days = (now - lead.created_at).num_days();
    if age_days > STALE_AFTER_DAYS && total < 60 {
        insights.push(insight(
            InsightType::Warning,
            InsightCategory::Timing,
            "Stale Lead",
            format!("Created {} days ago and still scoring {}", age_days, total),
            Priority::Low,
            Some("Re-engage with a fresh offer or archive"),
        ));
    }

    if score.predictive.conversion_probability >= 0.7 {
        insights.push(insight(
            InsightType::Opportunity,
            InsightCategory::Timing,
            "High Conversion Likelihood",
            format!(
                "Estimated conversion probability of {:.0}%",
                score.predictive.conversion_probability * 100.0
            ),
            Priority::High,
            Some("Prioritize in this week's pipeline review"),
        ));
    }

    insights.sort_by_key(|i| i.importance);
    insights
}

/// Short textual recommendations, deduplicated in first-seen order.
pub fn generate_recommendations(score: &LeadScore, insights: &[Insight]) -> Vec<String> {
    let flags = score.flags();
    let mut recommendations: Vec<String> = Vec::new();
    let mut push = |text: &str| {
        if !recommendations.iter().any(|r| r == text) {
            recommendations.push(text.to_string());
        }
    };

    if flags.is_hot() {
        push("Prioritize this lead for immediate sales outreach");
    }
    if flags.is_qualified() {
        push("Hand off to an account executive");
    }
    if flags.requires_nurturing() {
        push("Add to a nurture campaign");
    }
    if score.engagement_score() < 50 {
        push("Test new subject lines and send times");
    }
    if score.fit_score() < 50 {
        push("Verify the lead matches the ideal customer profile");
    }
    for suggestion in insights.iter().filter_map(|i| i.suggested_action.as_deref()) {
        push(suggestion);
    }

    recommendations
}

fn action(
    action: &str,
    channel: Channel,
    priority: Priority,
    timing: ActionTiming,
    reason: &str,
    expected_impact: f64,
    confidence: f64,
) -> NextBestAction {
    NextBestAction {
        id: Uuid::new_v4(),
        action: action.to_string(),
        channel,
        priority,
        timing,
        reason: reason.to_string(),
        expected_impact,
        confidence,
    }
}

/// The single primary action for a lead.
pub fn next_best_action(score: &LeadScore) -> NextBestAction {
    if score.total_score() >= 80 && score.intent_score() >= 70 {
        action(
            "Schedule demo call",
            Channel::Phone,
            Priority::High,
            ActionTiming::Immediate,
            "High score with strong buying intent",
            0.85,
            0.80,
        )
    } else if score.engagement_score() < 40 {
        action(
            "Try different channel",
            Channel::Linkedin,
            Priority::Medium,
            ActionTiming::ThisWeek,
            "Low response to email outreach",
            0.40,
            0.60,
        )
    } else {
        action(
            "Continue nurture",
            Channel::Email,
            Priority::Low,
            ActionTiming::ThisWeek,
            "Steady engagement without strong intent yet",
            0.30,
            0.70,
        )
    }
}

/// Primary action followed by any situational follow-ups, most urgent first.
pub fn next_best_actions(
    score: &LeadScore,
    lead: &Lead,
    history: &EngagementSummary,
) -> Vec<NextBestAction> {
    let primary = next_best_action(score);
    let mut secondary = Vec::new();

    if history.replies > 0 {
        secondary.push(action(
            "Respond to latest reply",
            Channel::Email,
            Priority::High,
            ActionTiming::Today,
            "Lead is in an active conversation",
            0.70,
            0.90,
        ));
    }
    if lead.title().is_some_and(is_senior_title) && !lead.has_phone() && !lead.has_social_url() {
        secondary.push(action(
            "Connect on LinkedIn",
            Channel::Linkedin,
            Priority::Medium,
            ActionTiming::ThisWeek,
            "Senior contact with email as the only channel",
            0.50,
            0.60,
        ));
    }
    if score.flags().is_qualified() && !score.flags().is_hot() && lead.has_phone() {
        secondary.push(action(
            "Book a qualification call",
            Channel::Phone,
            Priority::Medium,
            ActionTiming::ThisWeek,
            "Qualified lead with a known phone number",
            0.60,
            0.65,
        ));
    }

    secondary.retain(|a| a.channel != primary.channel || a.action != primary.action);
    secondary.sort_by_key(|a| (a.priority, a.timing));

    let mut actions = Vec::with_capacity(secondary.len() + 1);
    actions.push(primary);
    actions.extend(secondary);
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Enrichment, LeadStatus, PredictiveScores, SubScores};
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn lead(age_days: i64) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            email: "lee@corp.com".to_string(),
            first_name: None,
            last_name: None,
            company: Some("Corp".to_string()),
            title: None,
            phone: None,
            linkedin_url: None,
            twitter_handle: None,
            enrichment: Enrichment::default(),
            status: LeadStatus::Active,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    fn score(profile: i32, engagement: i32, behavior: i32, intent: i32, fit: i32) -> LeadScore {
        LeadScore::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            SubScores {
                profile,
                engagement,
                behavior,
                intent,
                fit,
            },
            BTreeMap::new(),
            PredictiveScores {
                conversion_probability: 0.1,
                churn_risk: 0.5,
                estimated_deal_size: 0.0,
                estimated_time_to_close: 60.0,
                estimated_lifetime_value: 0.0,
            },
            Utc::now(),
        )
    }

    fn titles(insights: &[Insight]) -> Vec<&str> {
        insights.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn test_hot_lead_insight() {
        let s = score(100, 90, 80, 80, 60);
        assert!(s.total_score() >= 80);
        let insights = generate_insights(&s, &lead(1), &EngagementSummary::default(), Utc::now());

        let hot = insights.iter().find(|i| i.title == "Hot Lead").unwrap();
        assert_eq!(hot.insight_type, InsightType::Positive);
        assert_eq!(hot.importance, Priority::High);
        assert!(hot.actionable);
    }

    #[test]
    fn test_low_score_and_stale() {
        let s = score(50, 0, 30, 30, 50);
        assert!(s.total_score() < 40);
        let insights = generate_insights(&s, &lead(45), &EngagementSummary::default(), Utc::now());

        let names = titles(&insights);
        assert!(names.contains(&"Low Score"));
        assert!(names.contains(&"Stale Lead"));
        assert!(!names.contains(&"Requires Nurturing"));
    }

    #[test]
    fn test_email_fatigue_needs_five_events_without_opens() {
        let s = score(60, 20, 50, 50, 60);
        let history = EngagementSummary {
            sent: 3,
            delivered: 2,
            total: 5,
            ..Default::default()
        };
        let insights = generate_insights(&s, &lead(1), &history, Utc::now());
        assert!(titles(&insights).contains(&"Email Fatigue"));

        let history = EngagementSummary {
            opens: 1,
            sent: 4,
            total: 5,
            ..Default::default()
        };
        let insights = generate_insights(&s, &lead(1), &history, Utc::now());
        assert!(!titles(&insights).contains(&"Email Fatigue"));
    }

    #[test]
    fn test_limited_contact_information() {
        let mut l = lead(1);
        l.title = Some("CTO".to_string());
        let s = score(70, 60, 50, 50, 60);

        let insights = generate_insights(&s, &l, &EngagementSummary::default(), Utc::now());
        assert!(titles(&insights).contains(&"Limited Contact Information"));

        l.linkedin_url = Some("https://linkedin.com/in/cto".to_string());
        let insights = generate_insights(&s, &l, &EngagementSummary::default(), Utc::now());
        assert!(!titles(&insights).contains(&"Limited Contact Information"));
    }

    #[test]
    fn test_insights_sorted_by_importance() {
        let history = EngagementSummary {
            replies: 1,
            total: 1,
            ..Default::default()
        };
        let s = score(50, 20, 30, 30, 40);
        let insights = generate_insights(&s, &lead(60), &history, Utc::now());

        let levels: Vec<Priority> = insights.iter().map(|i| i.importance).collect();
        let mut sorted = levels.clone();
        sorted.sort();
        assert_eq!(levels, sorted);
        assert_eq!(insights[0].title, "Active Conversation");
    }

    #[test]
    fn test_recommendations_deduplicated() {
        let s = score(50, 0, 30, 30, 40);
        let insights = generate_insights(&s, &lead(1), &EngagementSummary::default(), Utc::now());
        let recommendations = generate_recommendations(&s, &insights);

        let verify = recommendations
            .iter()
            .filter(|r| r.as_str() == "Verify the lead matches the ideal customer profile")
            .count();
        assert_eq!(verify, 1);
        assert!(recommendations.contains(&"Add to a nurture campaign".to_string()));
    }

    #[test]
    fn test_next_best_action_decision_table() {
        let hot = next_best_action(&score(100, 90, 80, 80, 60));
        assert_eq!(hot.channel, Channel::Phone);
        assert_eq!(hot.action, "Schedule demo call");
        assert_eq!(hot.priority, Priority::High);
        assert_eq!(hot.timing, ActionTiming::Immediate);
        assert_eq!(hot.expected_impact, 0.85);

        let cold = next_best_action(&score(60, 30, 50, 50, 60));
        assert_eq!(cold.channel, Channel::Linkedin);
        assert_eq!(cold.action, "Try different channel");

        let steady = next_best_action(&score(60, 60, 50, 50, 60));
        assert_eq!(steady.channel, Channel::Email);
        assert_eq!(steady.action, "Continue nurture");
        assert_eq!(steady.priority, Priority::Low);
    }

    #[test]
    fn test_next_best_actions_primary_first() {
        let mut l = lead(1);
        l.title = Some("Director of IT".to_string());
        let history = EngagementSummary {
            replies: 2,
            total: 2,
            ..Default::default()
        };
        let actions = next_best_actions(&score(60, 60, 50, 50, 60), &l, &history);

        assert_eq!(actions[0].action, "Continue nurture");
        assert_eq!(actions[1].action, "Respond to latest reply");
        assert_eq!(actions[2].action, "Connect on LinkedIn");
    }
}
