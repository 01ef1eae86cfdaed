//! Question catalog — the ordered stages of a scorecard and their options.
//!
//! The catalog is immutable after construction. It is validated once at
//! startup and then passed into the wizard engine; nothing in the bot
//! mutates it afterwards.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One question step in the fixed wizard sequence.
///
/// Progresses linearly: Round → Judge → Team → Place → Rating(0..n) →
/// Feedback → Confirmation. `Rating(i)` indexes the catalog's rating
/// categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Round,
    Judge,
    Team,
    Place,
    Rating(u8),
    Feedback,
    Confirmation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Round => write!(f, "round"),
            Self::Judge => write!(f, "judge"),
            Self::Team => write!(f, "team"),
            Self::Place => write!(f, "place"),
            Self::Rating(i) => write!(f, "rating_{}", i + 1),
            Self::Feedback => write!(f, "feedback"),
            Self::Confirmation => write!(f, "confirm"),
        }
    }
}

impl FromStr for Stage {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round" => Ok(Self::Round),
            "judge" => Ok(Self::Judge),
            "team" => Ok(Self::Team),
            "place" => Ok(Self::Place),
            "feedback" => Ok(Self::Feedback),
            "confirm" => Ok(Self::Confirmation),
            other => {
                let n: u8 = other.strip_prefix("rating_").ok_or(())?.parse().map_err(|_| ())?;
                if n == 0 {
                    return Err(());
                }
                Ok(Self::Rating(n - 1))
            }
        }
    }
}

/// A selectable question: display label, prompt text, and the ordered
/// options shown as buttons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceGroup {
    pub label: String,
    pub prompt: String,
    pub options: Vec<String>,
}

/// The free-text feedback question. Rendered with a single skip button
/// instead of an option list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackGroup {
    pub label: String,
    pub prompt: String,
    pub skip_option: String,
}

/// The final yes/no question. Exactly two options: affirm first,
/// reject second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationGroup {
    pub prompt: String,
    pub options: Vec<String>,
}

/// The full question catalog for one scorecard form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub round: ChoiceGroup,
    pub judge: ChoiceGroup,
    pub team: ChoiceGroup,
    pub place: ChoiceGroup,
    pub ratings: Vec<ChoiceGroup>,
    pub feedback: FeedbackGroup,
    pub confirmation: ConfirmationGroup,
}

impl Catalog {
    /// The built-in default form.
    pub fn builtin() -> Self {
        let scale = || (1..=5).map(|n| n.to_string()).collect::<Vec<_>>();
        Self {
            round: ChoiceGroup {
                label: "Round".into(),
                prompt: "Choose round:".into(),
                options: vec!["1".into(), "2".into(), "3".into()],
            },
            judge: ChoiceGroup {
                label: "Judge".into(),
                prompt: "Choose judge:".into(),
                options: vec!["Judge 1".into(), "Judge 2".into()],
            },
            team: ChoiceGroup {
                label: "Team".into(),
                prompt: "Choose team:".into(),
                options: vec![
                    "Team 1".into(),
                    "Team 2".into(),
                    "Team 3".into(),
                    "Team 4".into(),
                ],
            },
            place: ChoiceGroup {
                label: "Place".into(),
                prompt: "Choose place:".into(),
                options: vec!["1".into(), "2".into(), "3".into(), "4".into()],
            },
            ratings: vec![
                ChoiceGroup {
                    label: "Technique".into(),
                    prompt: "Rate technique (1-5):".into(),
                    options: scale(),
                },
                ChoiceGroup {
                    label: "Presentation".into(),
                    prompt: "Rate presentation (1-5):".into(),
                    options: scale(),
                },
            ],
            feedback: FeedbackGroup {
                label: "Feedback".into(),
                prompt: "Any feedback? Send it as a message, or skip.".into(),
                skip_option: "No feedback".into(),
            },
            confirmation: ConfirmationGroup {
                prompt: "Submit this scorecard?".into(),
                options: vec!["Yes, confirm".into(), "No, cancel".into()],
            },
        }
    }

    /// Load a catalog from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::CatalogParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Validate the catalog invariants. Fatal at startup if violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for stage in self.stages() {
            match stage {
                Stage::Feedback => {
                    if self.feedback.skip_option.trim().is_empty() {
                        return Err(ConfigError::CatalogInvalid(
                            "feedback skip option must not be empty".into(),
                        ));
                    }
                }
                Stage::Confirmation => {
                    if self.confirmation.options.len() != 2 {
                        return Err(ConfigError::CatalogInvalid(format!(
                            "confirmation needs exactly 2 options, got {}",
                            self.confirmation.options.len()
                        )));
                    }
                }
                other => {
                    let options = self
                        .options_for(other)
                        .expect("selectable stage has an option list");
                    if options.is_empty() {
                        return Err(ConfigError::CatalogInvalid(format!(
                            "stage {other} has no options"
                        )));
                    }
                }
            }
        }
        if self.ratings.is_empty() {
            return Err(ConfigError::CatalogInvalid(
                "at least one rating category is required".into(),
            ));
        }
        if self.ratings.len() > u8::MAX as usize {
            return Err(ConfigError::CatalogInvalid(format!(
                "too many rating categories: {}",
                self.ratings.len()
            )));
        }
        Ok(())
    }

    /// The first stage of the form.
    pub fn first_stage(&self) -> Stage {
        Stage::Round
    }

    /// The stage after `stage`, or None once Confirmation is answered.
    pub fn next_stage(&self, stage: Stage) -> Option<Stage> {
        match stage {
            Stage::Round => Some(Stage::Judge),
            Stage::Judge => Some(Stage::Team),
            Stage::Team => Some(Stage::Place),
            Stage::Place => Some(Stage::Rating(0)),
            Stage::Rating(i) if usize::from(i) + 1 < self.ratings.len() => {
                Some(Stage::Rating(i + 1))
            }
            Stage::Rating(_) => Some(Stage::Feedback),
            Stage::Feedback => Some(Stage::Confirmation),
            Stage::Confirmation => None,
        }
    }

    /// All stages in form order, Confirmation last.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::with_capacity(6 + self.ratings.len());
        let mut current = Some(self.first_stage());
        while let Some(stage) = current {
            stages.push(stage);
            current = self.next_stage(stage);
        }
        stages
    }

    /// The stages that carry an answer into the log: everything except
    /// Confirmation.
    pub fn answer_stages(&self) -> Vec<Stage> {
        self.stages()
            .into_iter()
            .filter(|s| *s != Stage::Confirmation)
            .collect()
    }

    /// Prompt text for a stage.
    pub fn prompt_for(&self, stage: Stage) -> &str {
        match stage {
            Stage::Round => &self.round.prompt,
            Stage::Judge => &self.judge.prompt,
            Stage::Team => &self.team.prompt,
            Stage::Place => &self.place.prompt,
            Stage::Rating(i) => &self.ratings[usize::from(i)].prompt,
            Stage::Feedback => &self.feedback.prompt,
            Stage::Confirmation => &self.confirmation.prompt,
        }
    }

    /// Human-readable label for a stage, used in running summaries and
    /// log column naming.
    pub fn label_for(&self, stage: Stage) -> &str {
        match stage {
            Stage::Round => &self.round.label,
            Stage::Judge => &self.judge.label,
            Stage::Team => &self.team.label,
            Stage::Place => &self.place.label,
            Stage::Rating(i) => &self.ratings[usize::from(i)].label,
            Stage::Feedback => &self.feedback.label,
            Stage::Confirmation => "Confirm",
        }
    }

    /// Ordered options for a selectable stage. None for the free-text
    /// feedback stage.
    pub fn options_for(&self, stage: Stage) -> Option<&[String]> {
        match stage {
            Stage::Round => Some(&self.round.options),
            Stage::Judge => Some(&self.judge.options),
            Stage::Team => Some(&self.team.options),
            Stage::Place => Some(&self.place.options),
            Stage::Rating(i) => self.ratings.get(usize::from(i)).map(|r| r.options.as_slice()),
            Stage::Feedback => None,
            Stage::Confirmation => Some(&self.confirmation.options),
        }
    }

    /// The affirmative confirmation option.
    pub fn confirm_yes(&self) -> &str {
        &self.confirmation.options[0]
    }

    /// The rejecting confirmation option.
    pub fn confirm_no(&self) -> &str {
        &self.confirmation.options[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_valid() {
        Catalog::builtin().validate().unwrap();
    }

    #[test]
    fn stages_walk_from_round_to_confirmation() {
        let catalog = Catalog::builtin();
        let stages = catalog.stages();
        assert_eq!(stages.first(), Some(&Stage::Round));
        assert_eq!(stages.last(), Some(&Stage::Confirmation));
        // 4 choice stages + 2 ratings + feedback + confirmation
        assert_eq!(stages.len(), 8);
        assert_eq!(catalog.next_stage(Stage::Confirmation), None);
    }

    #[test]
    fn stages_have_no_cycles() {
        let catalog = Catalog::builtin();
        let stages = catalog.stages();
        let mut seen = std::collections::HashSet::new();
        for stage in stages {
            assert!(seen.insert(stage), "stage {stage} visited twice");
        }
    }

    #[test]
    fn rating_count_drives_stage_count() {
        let mut catalog = Catalog::builtin();
        catalog.ratings.push(ChoiceGroup {
            label: "Difficulty".into(),
            prompt: "Rate difficulty (1-5):".into(),
            options: vec!["1".into(), "2".into()],
        });
        assert_eq!(catalog.stages().len(), 9);
        assert_eq!(catalog.next_stage(Stage::Rating(1)), Some(Stage::Rating(2)));
        assert_eq!(catalog.next_stage(Stage::Rating(2)), Some(Stage::Feedback));
    }

    #[test]
    fn answer_stages_exclude_confirmation() {
        let catalog = Catalog::builtin();
        let answers = catalog.answer_stages();
        assert!(!answers.contains(&Stage::Confirmation));
        assert_eq!(answers.len(), catalog.stages().len() - 1);
        assert_eq!(answers.last(), Some(&Stage::Feedback));
    }

    #[test]
    fn options_for_feedback_is_none() {
        let catalog = Catalog::builtin();
        assert!(catalog.options_for(Stage::Feedback).is_none());
        assert!(catalog.options_for(Stage::Round).is_some());
    }

    #[test]
    fn empty_option_set_fails_validation() {
        let mut catalog = Catalog::builtin();
        catalog.team.options.clear();
        let err = catalog.validate().unwrap_err();
        assert!(err.to_string().contains("team"));
    }

    #[test]
    fn empty_rating_scale_fails_validation() {
        let mut catalog = Catalog::builtin();
        catalog.ratings[1].options.clear();
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn no_rating_categories_fails_validation() {
        let mut catalog = Catalog::builtin();
        catalog.ratings.clear();
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn three_confirmation_options_fail_validation() {
        let mut catalog = Catalog::builtin();
        catalog.confirmation.options.push("Maybe".into());
        let err = catalog.validate().unwrap_err();
        assert!(err.to_string().contains("confirmation"));
    }

    #[test]
    fn stage_display_roundtrips_through_from_str() {
        let catalog = Catalog::builtin();
        for stage in catalog.stages() {
            let s = stage.to_string();
            assert_eq!(s.parse::<Stage>(), Ok(stage), "roundtrip for {s}");
        }
    }

    #[test]
    fn bad_stage_strings_are_rejected() {
        assert!("".parse::<Stage>().is_err());
        assert!("rating_0".parse::<Stage>().is_err());
        assert!("rating_x".parse::<Stage>().is_err());
        assert!("ROUND".parse::<Stage>().is_err());
    }

    #[test]
    fn catalog_serde_roundtrip() {
        let catalog = Catalog::builtin();
        let json = serde_json::to_string(&catalog).unwrap();
        let parsed: Catalog = serde_json::from_str(&json).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.judge.options, catalog.judge.options);
        assert_eq!(parsed.ratings.len(), catalog.ratings.len());
    }
}
