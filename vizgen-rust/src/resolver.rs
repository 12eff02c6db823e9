use crate::{normalize, MatchPolicy, Registry, RegistryEntry};

/// Maps a free-text prompt to a registry entry by substring containment
/// over normalized aliases, titles and ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    policy: MatchPolicy,
}

impl Resolver {
    #[must_use]
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    /// The matching entry, or `None` on a miss. Never mutates the registry.
    #[must_use]
    pub fn resolve<'a>(&self, registry: &'a Registry, prompt: &str) -> Option<&'a RegistryEntry> {
        let prompt = normalize(prompt);
        if prompt.is_empty() {
            return None;
        }

        let mut matches = registry
            .concepts
            .iter()
            .filter_map(|entry| match_len(entry, &prompt).map(|len| (entry, len)));

        match self.policy {
            MatchPolicy::FirstMatch => matches.next().map(|(entry, _)| entry),
            MatchPolicy::LongestMatch => matches
                .fold(None, |best: Option<(&RegistryEntry, usize)>, (entry, len)| {
                    match best {
                        Some((_, best_len)) if best_len >= len => best,
                        _ => Some((entry, len)),
                    }
                })
                .map(|(entry, _)| entry),
        }
    }
}

/// Length of the longest key of `entry` that matches `prompt`.
fn match_len(entry: &RegistryEntry, prompt: &str) -> Option<usize> {
    let contains_either = |key: &str| {
        let key = normalize(key);
        (!key.is_empty() && (key.contains(prompt) || prompt.contains(&key)))
            .then(|| key.chars().count())
    };

    let id = normalize(&entry.id);
    let id_match = (!id.is_empty() && prompt.contains(&id)).then(|| id.chars().count());

    entry
        .aliases()
        .iter()
        .filter_map(|alias| contains_either(alias))
        .chain(contains_either(entry.title()))
        .chain(id_match)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut registry = Registry::default();
        registry.upsert(
            RegistryEntry::new("normal_distribution")
                .with_title("标准正态分布")
                .with_aliases(["正态分布", "Gaussian"]),
        );
        registry.upsert(
            RegistryEntry::new("matrix")
                .with_title("矩阵")
                .with_aliases(["矩阵"]),
        );
        registry.upsert(
            RegistryEntry::new("matrix_transform")
                .with_title("二维矩阵变换")
                .with_aliases(["矩阵变换"]),
        );
        registry
    }

    #[test]
    fn matches_in_both_directions() {
        let registry = registry();
        let resolver = Resolver::default();
        // prompt inside alias
        assert_eq!(resolver.resolve(&registry, "正态").unwrap().id, "normal_distribution");
        // alias inside prompt, case and whitespace ignored
        assert_eq!(
            resolver.resolve(&registry, "show me a GAUSSIAN curve").unwrap().id,
            "normal_distribution"
        );
        // id inside prompt
        assert_eq!(
            resolver.resolve(&registry, "plot normal_distribution please").unwrap().id,
            "normal_distribution"
        );
        assert!(resolver.resolve(&registry, "泊松分布").is_none());
    }

    #[test]
    fn first_match_follows_registry_order() {
        let registry = registry();
        let entry = Resolver::new(MatchPolicy::FirstMatch)
            .resolve(&registry, "矩阵变换示意")
            .unwrap();
        assert_eq!(entry.id, "matrix");
    }

    #[test]
    fn longest_match_prefers_the_more_specific_key() {
        let registry = registry();
        let entry = Resolver::new(MatchPolicy::LongestMatch)
            .resolve(&registry, "矩阵变换示意")
            .unwrap();
        assert_eq!(entry.id, "matrix_transform");
    }

    #[test]
    fn empty_keys_and_prompts_never_match() {
        let mut registry = Registry::default();
        registry.upsert(RegistryEntry::new("x").with_title(" ").with_aliases([""]));
        let resolver = Resolver::default();
        assert!(resolver.resolve(&registry, "anything").is_none());
        assert!(resolver.resolve(&registry, "   ").is_none());
    }
}
