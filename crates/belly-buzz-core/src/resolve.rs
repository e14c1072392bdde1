//! Identity resolution and grouping.
//!
//! [`IdentityResolver`] assigns each [`ExtractedMention`] a
//! [`ResolutionKey`]: the external place id when the lookup finds one, else
//! the normalized name. [`MentionQueue`] then folds mentions into
//! [`MentionGroup`]s in arrival order.
//!
//! Group identity depends on arrival order (the first mention of a key
//! supplies the group's PlaceMatch), so callers must feed mentions in
//! ingestion order for runs to be reproducible.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::models::{ExtractedMention, GroupedMention, MentionGroup, PlaceMatch, ResolutionKey};
use crate::normalize::normalize_name;
use crate::traits::PlaceLookup;

/// Result of resolving one mention.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub key: ResolutionKey,
    pub place: Option<PlaceMatch>,
}

/// Resolves mentions to keys, memoizing lookups for the lifetime of a run.
pub struct IdentityResolver<'a> {
    places: &'a dyn PlaceLookup,
    city: String,
    cache: HashMap<String, Option<PlaceMatch>>,
    lookups: usize,
    failures: usize,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(places: &'a dyn PlaceLookup, city: impl Into<String>) -> Self {
        Self {
            places,
            city: city.into(),
            cache: HashMap::new(),
            lookups: 0,
            failures: 0,
        }
    }

    /// Resolve one mention.
    ///
    /// Never fails: a lookup error is logged and treated as "no match",
    /// and the outcome (hit, miss, or failure) is cached under the
    /// normalized name so repeated names cost one lookup per run.
    pub async fn resolve(&mut self, mention: &ExtractedMention) -> Resolution {
        let normalized = normalize_name(&mention.name);

        let place = match self.cache.get(&normalized) {
            Some(cached) => cached.clone(),
            None => {
                self.lookups += 1;
                let found = match self.places.find_place(mention.name.trim(), &self.city).await {
                    Ok(found) => found.filter(|p| !p.place_id.trim().is_empty()),
                    Err(e) => {
                        self.failures += 1;
                        if e.is_unavailable() {
                            debug!(name = %mention.name, "place lookup unavailable: {}", e);
                        } else {
                            warn!(name = %mention.name, "place lookup failed: {}", e);
                        }
                        None
                    }
                };
                self.cache.insert(normalized.clone(), found.clone());
                found
            }
        };

        let key = match &place {
            Some(p) => ResolutionKey::Place(p.place_id.clone()),
            None => ResolutionKey::Name(normalized),
        };

        Resolution { key, place }
    }

    /// Number of outbound lookups performed (cache misses).
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Number of lookups that ended in an error.
    pub fn failures(&self) -> usize {
        self.failures
    }
}

/// What [`MentionQueue::push`] did with a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First mention for its key; a new group was opened.
    Created,
    /// Added to an existing group.
    Appended,
    /// The queue is full and the key is new; the mention was dropped.
    Rejected,
}

/// Bounded, insertion-ordered map from [`ResolutionKey`] to [`MentionGroup`].
pub struct MentionQueue {
    capacity: usize,
    index: HashMap<ResolutionKey, usize>,
    groups: Vec<MentionGroup>,
}

impl MentionQueue {
    /// Create a queue holding at most `capacity` groups.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    /// Add a resolved mention.
    ///
    /// The first mention of a key captures the PlaceMatch for the group;
    /// later mentions only contribute their text and signal.
    pub fn push(&mut self, resolution: Resolution, mention: GroupedMention) -> Admission {
        if let Some(&idx) = self.index.get(&resolution.key) {
            self.groups[idx].mentions.push(mention);
            return Admission::Appended;
        }

        if self.groups.len() >= self.capacity {
            return Admission::Rejected;
        }

        self.index.insert(resolution.key.clone(), self.groups.len());
        self.groups.push(MentionGroup {
            key: resolution.key,
            place: resolution.place,
            mentions: vec![mention],
        });
        Admission::Created
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[MentionGroup] {
        &self.groups
    }

    /// Consume the queue, yielding groups in first-seen order.
    pub fn into_groups(self) -> Vec<MentionGroup> {
        self.groups
    }
}
