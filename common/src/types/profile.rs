use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const WEIGHT_SUM_EPSILON: f32 = 1e-6;

/// A named bundle of retrieval/generation tuning parameters.
///
/// Profiles parameterize every stage of a request and are read-only for the
/// request's duration; swapping tunables at runtime goes through
/// [`ProfileStore::configure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub similarity_threshold: f32,
    pub max_chunks: usize,
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub max_context_chars: usize,
    pub model_name: String,
    pub temperature: f32,
}

impl Profile {
    /// Checks the profile invariants. Violations are configuration defects
    /// and are never silently corrected.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Configuration(
                "profile name must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(AppError::Configuration(format!(
                "profile '{}': similarity_threshold {} outside [0, 1]",
                self.name, self.similarity_threshold
            )));
        }
        if self.semantic_weight < 0.0 || self.keyword_weight < 0.0 {
            return Err(AppError::Configuration(format!(
                "profile '{}': weights must be non-negative",
                self.name
            )));
        }
        let weight_sum = self.semantic_weight + self.keyword_weight;
        if (weight_sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(AppError::Configuration(format!(
                "profile '{}': semantic_weight + keyword_weight must equal 1.0, got {weight_sum}",
                self.name
            )));
        }
        if self.max_chunks == 0 {
            return Err(AppError::Configuration(format!(
                "profile '{}': max_chunks must be greater than zero",
                self.name
            )));
        }
        if self.max_context_chars == 0 {
            return Err(AppError::Configuration(format!(
                "profile '{}': max_context_chars must be greater than zero",
                self.name
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AppError::Configuration(format!(
                "profile '{}': temperature {} outside [0, 2]",
                self.name, self.temperature
            )));
        }
        Ok(())
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            similarity_threshold: 0.35,
            max_chunks: 5,
            semantic_weight: 0.8,
            keyword_weight: 0.2,
            max_context_chars: 12000,
            model_name: "gpt-4o-mini".to_string(),
            temperature: 0.2,
        }
    }
}

/// Process-wide profile registry.
///
/// Reads happen on every request; writes only on administrative reconfigure.
/// A plain `RwLock` keeps the hot path cheap, and requests clone the profile
/// out so a concurrent `configure` never changes tunables mid-request.
#[derive(Debug)]
pub struct ProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl ProfileStore {
    /// Builds a store seeded with the given profiles. Every seed profile is
    /// validated; an invalid profile is fatal at load time.
    pub fn new(seed: Vec<Profile>) -> Result<Self, AppError> {
        let mut profiles = HashMap::with_capacity(seed.len().max(1));
        for profile in seed {
            profile.validate()?;
            profiles.insert(profile.name.clone(), profile);
        }
        profiles
            .entry("default".to_string())
            .or_insert_with(Profile::default);
        Ok(Self {
            profiles: RwLock::new(profiles),
        })
    }

    pub fn get(&self, name: &str) -> Result<Profile, AppError> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("profile '{name}' is not configured")))
    }

    /// Validates and installs (or replaces) a profile.
    pub fn configure(&self, profile: Profile) -> Result<(), AppError> {
        profile.validate()?;
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.name.clone(), profile);
        Ok(())
    }

    /// All configured profiles, sorted by name for stable output.
    pub fn list(&self) -> Vec<Profile> {
        let mut profiles: Vec<Profile> = self
            .profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_profile(name: &str) -> Profile {
        Profile {
            name: name.to_string(),
            ..Profile::default()
        }
    }

    #[test]
    fn validate_rejects_weights_not_summing_to_one() {
        let profile = Profile {
            semantic_weight: 0.8,
            keyword_weight: 0.3,
            ..Profile::default()
        };
        assert!(matches!(
            profile.validate(),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn validate_rejects_threshold_outside_unit_range() {
        let profile = Profile {
            similarity_threshold: 1.2,
            ..Profile::default()
        };
        assert!(matches!(
            profile.validate(),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_budgets() {
        let profile = Profile {
            max_context_chars: 0,
            ..Profile::default()
        };
        assert!(profile.validate().is_err());

        let profile = Profile {
            max_chunks: 0,
            ..Profile::default()
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn store_always_has_a_default_profile() {
        let store = ProfileStore::new(vec![]).expect("empty seed should be fine");
        let profile = store.get("default").expect("default profile missing");
        assert_eq!(profile.name, "default");
    }

    #[test]
    fn configure_then_list_round_trips_tunables() {
        let store = ProfileStore::new(vec![]).expect("store");
        let mut custom = valid_profile("strict");
        custom.similarity_threshold = 0.7;
        custom.max_chunks = 3;
        custom.temperature = 0.0;

        store.configure(custom.clone()).expect("configure");

        let listed = store.list();
        let reloaded = listed
            .iter()
            .find(|p| p.name == "strict")
            .expect("configured profile should be listed");
        assert_eq!(reloaded, &custom);
    }

    #[test]
    fn configure_rejects_invalid_profile_without_installing_it() {
        let store = ProfileStore::new(vec![]).expect("store");
        let mut broken = valid_profile("broken");
        broken.keyword_weight = 0.5;

        assert!(store.configure(broken).is_err());
        assert!(store.get("broken").is_err());
    }

    #[test]
    fn seed_with_invalid_profile_is_fatal() {
        let mut bad = valid_profile("bad");
        bad.temperature = 9.0;
        assert!(ProfileStore::new(vec![bad]).is_err());
    }
}
