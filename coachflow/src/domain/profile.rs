//! User profile.

use serde::{Deserialize, Serialize};

/// Biological sex used by energy-expenditure formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    /// Male.
    Male,
    /// Female.
    Female,
    /// Other or unspecified.
    Other,
}

/// Training experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessLevel {
    /// Under a year of consistent training.
    #[default]
    Beginner,
    /// One to three years.
    Intermediate,
    /// Three years or more.
    Advanced,
}

/// Daily activity outside training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    /// Desk job, little exercise.
    Sedentary,
    /// Light exercise one to three days a week.
    Light,
    /// Moderate exercise three to five days a week.
    #[default]
    Moderate,
    /// Hard exercise six to seven days a week.
    Active,
    /// Physical job plus hard exercise.
    VeryActive,
}

impl ActivityLevel {
    /// Standard TDEE multiplier for the level.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Sedentary => 1.2,
            Self::Light => 1.375,
            Self::Moderate => 1.55,
            Self::Active => 1.725,
            Self::VeryActive => 1.9,
        }
    }
}

/// A user's profile as stored in the `profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Age in years.
    pub age: u32,
    /// Sex.
    pub gender: Gender,
    /// Body weight in kilograms.
    pub weight_kg: f64,
    /// Height in centimetres.
    pub height_cm: f64,
    /// Daily activity.
    #[serde(default)]
    pub activity_level: ActivityLevel,
    /// Training experience.
    #[serde(default)]
    pub fitness_level: FitnessLevel,
    /// Free-form goals.
    #[serde(default)]
    pub goals: Vec<String>,
    /// Injuries and body areas to protect, e.g. `knee`.
    #[serde(default)]
    pub limitations: Vec<String>,
    /// Available equipment.
    #[serde(default)]
    pub equipment: Vec<String>,
    /// Dietary restrictions.
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
}

impl UserProfile {
    /// Returns true if any limitation mentions `area`.
    #[must_use]
    pub fn has_limitation(&self, area: &str) -> bool {
        let area = area.to_lowercase();
        self.limitations
            .iter()
            .any(|l| l.to_lowercase().contains(&area))
    }
}
