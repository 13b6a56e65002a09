//! Masked identity derivation.
//!
//! The pseudonym and avatar a party sees for their counterpart are a pure
//! function of `(match_id, counterpart_id)`, so the same masked identity
//! shows up across sessions and devices. Nothing here is randomized per
//! call.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use circle_types::models::{MaskedProfile, Profile};

const ADJECTIVES: &[&str] = &[
    "Amber", "Azure", "Crimson", "Dusky", "Emerald", "Golden", "Indigo", "Ivory", "Jade",
    "Lilac", "Misty", "Pearl", "Scarlet", "Silver", "Teal", "Violet",
];

const ANIMALS: &[&str] = &[
    "Fox", "Owl", "Wren", "Lynx", "Hare", "Swan", "Crane", "Otter", "Robin", "Finch",
    "Heron", "Doe", "Raven", "Sparrow", "Badger", "Dove",
];

fn digest(match_id: Uuid, counterpart_id: Uuid) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(match_id.as_bytes());
    hasher.update(counterpart_id.as_bytes());
    hasher.finalize().into()
}

/// Stable pseudonymous label, e.g. "Misty Heron".
pub fn pseudonym(match_id: Uuid, counterpart_id: Uuid) -> String {
    let d = digest(match_id, counterpart_id);
    let adjective = ADJECTIVES[d[0] as usize % ADJECTIVES.len()];
    let animal = ANIMALS[d[1] as usize % ANIMALS.len()];
    format!("{adjective} {animal}")
}

/// Generated-avatar URI seeded from the same digest.
pub fn anonymous_avatar(match_id: Uuid, counterpart_id: Uuid) -> String {
    let d = digest(match_id, counterpart_id);
    let seed = hex::encode(&d[..8]);
    format!("https://api.dicebear.com/9.x/shapes/svg?seed={seed}")
}

/// Filter a counterpart profile for one party's view.
///
/// This is the single code path producing counterpart-visible profile
/// data: identifying fields leave this function only when `revealed` is
/// true, which callers set from `RevealState::is_both_revealed()` alone.
pub fn mask_profile(match_id: Uuid, profile: &Profile, revealed: bool) -> MaskedProfile {
    if revealed {
        let display_name = format!("{} {}", profile.first_name, profile.last_name)
            .trim()
            .to_string();
        MaskedProfile {
            display_name,
            username: Some(profile.username.clone()),
            age: profile.age,
            gender: profile.gender.clone(),
            about: profile.about.clone(),
            interests: profile.interests.clone(),
            profile_photo_url: profile.profile_photo_url.clone(),
            location_city: profile.location_city.clone(),
            anonymous_avatar: None,
            is_revealed: true,
        }
    } else {
        MaskedProfile {
            display_name: pseudonym(match_id, profile.user_id),
            username: None,
            age: profile.age,
            gender: profile.gender.clone(),
            about: profile.about.clone(),
            interests: profile.interests.clone(),
            profile_photo_url: None,
            location_city: None,
            anonymous_avatar: Some(anonymous_avatar(match_id, profile.user_id)),
            is_revealed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(user_id: Uuid) -> Profile {
        Profile {
            user_id,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            username: "ada".to_string(),
            age: Some(28),
            gender: Some("f".to_string()),
            about: Some("likes graphs".to_string()),
            interests: vec!["math".to_string()],
            profile_photo_url: Some("https://cdn.example/ada.jpg".to_string()),
            location_city: Some("London".to_string()),
        }
    }

    #[test]
    fn pseudonym_is_deterministic() {
        let m = Uuid::new_v4();
        let u = Uuid::new_v4();
        assert_eq!(pseudonym(m, u), pseudonym(m, u));
        assert_eq!(anonymous_avatar(m, u), anonymous_avatar(m, u));
    }

    #[test]
    fn pseudonym_differs_per_match() {
        let u = Uuid::new_v4();
        let a = anonymous_avatar(Uuid::new_v4(), u);
        let b = anonymous_avatar(Uuid::new_v4(), u);
        assert_ne!(a, b);
    }

    #[test]
    fn masked_profile_strips_identity() {
        let m = Uuid::new_v4();
        let p = profile(Uuid::new_v4());
        let masked = mask_profile(m, &p, false);

        assert!(!masked.is_revealed);
        assert!(masked.username.is_none());
        assert!(masked.profile_photo_url.is_none());
        assert!(masked.location_city.is_none());
        assert!(!masked.display_name.contains("Ada"));
        assert!(!masked.display_name.contains("Lovelace"));
        assert!(masked.anonymous_avatar.is_some());
        // Non-identifying fields pass through
        assert_eq!(masked.age, Some(28));
        assert_eq!(masked.interests, vec!["math".to_string()]);
    }

    #[test]
    fn revealed_profile_passes_through() {
        let m = Uuid::new_v4();
        let p = profile(Uuid::new_v4());
        let unmasked = mask_profile(m, &p, true);

        assert!(unmasked.is_revealed);
        assert_eq!(unmasked.display_name, "Ada Lovelace");
        assert_eq!(unmasked.username.as_deref(), Some("ada"));
        assert_eq!(
            unmasked.profile_photo_url.as_deref(),
            Some("https://cdn.example/ada.jpg")
        );
        assert!(unmasked.anonymous_avatar.is_none());
    }
}
