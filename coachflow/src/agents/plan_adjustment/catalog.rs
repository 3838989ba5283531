//! Keyword tables used by the rule-based collaborators.

/// A trainable focus area with its keywords and go-to exercises.
#[derive(Debug, Clone, Copy)]
pub struct Focus {
    /// Canonical name, also used as the muscle group.
    pub name: &'static str,
    /// Words that identify the focus in feedback.
    pub keywords: &'static [&'static str],
    /// Exercises to add, best first.
    pub exercises: &'static [&'static str],
    /// Body-part words that limit this focus when injured.
    pub body_parts: &'static [&'static str],
}

pub const FOCUSES: &[Focus] = &[
    Focus {
        name: "legs",
        keywords: &["leg", "legs", "quad", "quads", "hamstring", "glute", "calf", "calves", "lower body"],
        exercises: &["Bulgarian Split Squat", "Romanian Deadlift", "Walking Lunge", "Leg Press", "Calf Raise"],
        body_parts: &["knee", "hip", "ankle"],
    },
    Focus {
        name: "chest",
        keywords: &["chest", "pec", "pecs"],
        exercises: &["Incline Dumbbell Press", "Push-Up", "Cable Fly"],
        body_parts: &["shoulder", "wrist"],
    },
    Focus {
        name: "back",
        keywords: &["back", "lats", "upper back"],
        exercises: &["Seated Cable Row", "Lat Pulldown", "Chest-Supported Row"],
        body_parts: &["lower back", "elbow"],
    },
    Focus {
        name: "shoulders",
        keywords: &["shoulder", "shoulders", "delts"],
        exercises: &["Lateral Raise", "Face Pull", "Seated Dumbbell Press"],
        body_parts: &["shoulder"],
    },
    Focus {
        name: "arms",
        keywords: &["arm", "arms", "bicep", "biceps", "tricep", "triceps"],
        exercises: &["Dumbbell Curl", "Triceps Pushdown", "Hammer Curl"],
        body_parts: &["elbow", "wrist"],
    },
    Focus {
        name: "core",
        keywords: &["core", "abs", "ab", "abdominal", "obliques"],
        exercises: &["Plank", "Dead Bug", "Pallof Press"],
        body_parts: &["lower back"],
    },
    Focus {
        name: "cardio",
        keywords: &["cardio", "conditioning", "endurance", "running"],
        exercises: &["Rowing Intervals", "Bike Intervals", "Incline Walk"],
        body_parts: &[],
    },
];

pub const BODY_PARTS: &[&str] = &[
    "lower back", "knee", "shoulder", "back", "wrist", "elbow", "hip", "ankle", "neck",
];

pub const EQUIPMENT: &[(&str, &str)] = &[
    ("barbell", "Goblet Squat"),
    ("dumbbell", "Push-Up"),
    ("bench", "Floor Press"),
    ("machine", "Bodyweight Squat"),
    ("cable", "Resistance Band Row"),
    ("kettlebell", "Bodyweight Hip Hinge"),
    ("pull-up bar", "Inverted Row"),
];

/// Exercise swaps keyed by a word in the original name.
pub const SUBSTITUTES: &[(&str, &str)] = &[
    ("squat", "Leg Press"),
    ("deadlift", "Hip Thrust"),
    ("bench", "Dumbbell Press"),
    ("overhead press", "Landmine Press"),
    ("pull-up", "Lat Pulldown"),
    ("row", "Chest-Supported Row"),
    ("lunge", "Step-Up"),
    ("curl", "Cable Curl"),
];

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .collect::<Vec<_>>()
        .windows(word.split(' ').count())
        .any(|window| window.join(" ") == word)
}

/// Finds the focus a piece of text refers to.
#[must_use]
pub fn find_focus(text: &str) -> Option<&'static Focus> {
    let text = text.to_lowercase();
    FOCUSES
        .iter()
        .find(|focus| focus.keywords.iter().any(|k| contains_word(&text, k)))
}

/// Returns the focus with the given canonical name.
#[must_use]
pub fn focus_named(name: &str) -> Option<&'static Focus> {
    let name = name.to_lowercase();
    FOCUSES.iter().find(|f| f.name == name)
}

/// Finds the first body part mentioned in text.
#[must_use]
pub fn find_body_part(text: &str) -> Option<&'static str> {
    let text = text.to_lowercase();
    BODY_PARTS.iter().copied().find(|part| contains_word(&text, part))
}

/// Finds the first piece of equipment mentioned in text.
#[must_use]
pub fn find_equipment(text: &str) -> Option<&'static str> {
    let text = text.to_lowercase();
    EQUIPMENT
        .iter()
        .map(|(name, _)| *name)
        .find(|name| text.contains(name))
}

/// Bodyweight alternative for exercises needing `equipment`.
#[must_use]
pub fn equipment_alternative(equipment: &str) -> Option<&'static str> {
    let equipment = equipment.to_lowercase();
    EQUIPMENT
        .iter()
        .find(|(name, _)| equipment.contains(name))
        .map(|(_, alt)| *alt)
}

/// Default substitute for an exercise.
#[must_use]
pub fn substitute_for(exercise: &str) -> Option<&'static str> {
    let exercise = exercise.to_lowercase();
    SUBSTITUTES
        .iter()
        .find(|(word, _)| exercise.contains(word))
        .map(|(_, sub)| *sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_focus() {
        assert_eq!(find_focus("add more leg exercises").map(|f| f.name), Some("legs"));
        assert_eq!(find_focus("I want bigger Biceps").map(|f| f.name), Some("arms"));
        assert!(find_focus("make it fun").is_none());
    }

    #[test]
    fn test_word_matching_is_whole_word() {
        assert!(find_focus("absolutely").is_none());
        assert_eq!(find_body_part("my lower back hurts"), Some("lower back"));
        assert_eq!(find_body_part("knee pain on squats"), Some("knee"));
    }

    #[test]
    fn test_substitutes_and_equipment() {
        assert_eq!(substitute_for("Back Squat"), Some("Leg Press"));
        assert_eq!(find_equipment("i don't have a barbell"), Some("barbell"));
        assert_eq!(equipment_alternative("Dumbbell"), Some("Push-Up"));
    }
}
