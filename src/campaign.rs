use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Urgent,
    Moderate,
    Baseline,
}

impl Tone {
    pub fn from_urgency(urgency: f64) -> Self {
        if urgency > 0.7 {
            Tone::Urgent
        } else if urgency > 0.4 {
            Tone::Moderate
        } else {
            Tone::Baseline
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tone::Urgent => "URGENT ACTION REQUIRED",
            Tone::Moderate => "Update on Crisis",
            Tone::Baseline => "Support Our Mission",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignCopy {
    pub cluster_id: usize,
    pub tone: Tone,
    pub headline: String,
    pub body: String,
    pub ask: String,
}

impl CampaignCopy {
    pub fn social_post(&self, crisis_name: &str) -> String {
        let tag: String = crisis_name.chars().filter(|c| *c != ' ').collect();
        format!("{} #Relief #{}", self.headline, tag)
    }
}

/// Suggested appeal copy; higher urgency gives more direct language.
pub fn generate_copy(
    cluster_id: usize,
    urgency: f64,
    crisis_name: &str,
    ask_amount: u32,
) -> CampaignCopy {
    let tone = Tone::from_urgency(urgency);
    let body = match tone {
        Tone::Urgent => format!(
            "The situation with {crisis_name} is critical. Data indicates you are one of our most reliable supporters. We need you now."
        ),
        Tone::Moderate => format!(
            "We are monitoring {crisis_name} closely. Your support has always been vital. Can you help today?"
        ),
        Tone::Baseline => format!(
            "As we look at the impact of {crisis_name}, we are reminded of the power of community. Join us."
        ),
    };

    CampaignCopy {
        cluster_id,
        tone,
        headline: format!("{}: Help {crisis_name} Victims", tone.label()),
        body,
        ask: format!("Please donate ${ask_amount}."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_tiers_use_strict_thresholds() {
        assert_eq!(Tone::from_urgency(0.71), Tone::Urgent);
        assert_eq!(Tone::from_urgency(0.7), Tone::Moderate);
        assert_eq!(Tone::from_urgency(0.41), Tone::Moderate);
        assert_eq!(Tone::from_urgency(0.4), Tone::Baseline);
        assert_eq!(Tone::from_urgency(0.0), Tone::Baseline);
    }

    #[test]
    fn urgent_copy_is_direct() {
        let copy = generate_copy(0, 0.78, "Sudan War", 50);
        assert_eq!(copy.headline, "URGENT ACTION REQUIRED: Help Sudan War Victims");
        assert!(copy.body.starts_with("The situation with Sudan War is critical."));
        assert_eq!(copy.ask, "Please donate $50.");
    }

    #[test]
    fn neutral_urgency_gets_update_tone() {
        let copy = generate_copy(3, 0.5, "Floods", 25);
        assert_eq!(copy.tone, Tone::Moderate);
        assert_eq!(copy.cluster_id, 3);
        assert_eq!(copy.headline, "Update on Crisis: Help Floods Victims");
    }

    #[test]
    fn social_post_tags_crisis_without_spaces() {
        let copy = generate_copy(0, 0.1, "Sudan War", 50);
        assert_eq!(
            copy.social_post("Sudan War"),
            "Support Our Mission: Help Sudan War Victims #Relief #SudanWar"
        );
    }
}
