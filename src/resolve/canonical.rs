//! Representative selection for a cluster.

use tracing::warn;

use crate::config::IdentifierConflictPolicy;
use crate::models::{Cluster, IdentifierConflict, SourceRecord};
use crate::store::ClusterPlan;

/// What to do with a cluster after canonicalization
#[derive(Debug, Clone, PartialEq)]
pub enum Canonical {
    /// Ready to commit; `conflict` is set when members disagreed on the identifier
    Commit {
        plan: ClusterPlan,
        conflict: Option<IdentifierConflict>,
    },
    /// Left unresolved for manual review
    Hold(IdentifierConflict),
}

/// Pick the cluster's canonical name and identifier.
///
/// `members` must be the cluster's records in member order (sorted by id).
/// The name is the longest non-empty full name, the first one winning ties.
/// The identifier is the first non-empty one; further distinct identifiers
/// are reported as a conflict and handled according to `policy`.
pub fn canonicalize(
    cluster: &Cluster,
    members: &[&SourceRecord],
    policy: IdentifierConflictPolicy,
) -> Canonical {
    let mut representative: Option<&SourceRecord> = None;
    let mut longest = 0;
    for record in members {
        let len = record.full_name().chars().count();
        if len > longest {
            longest = len;
            representative = Some(*record);
        }
    }

    let (given_name, family_name, canonical_name) = match representative {
        Some(r) => (
            r.given_name.trim().to_string(),
            r.family_name.trim().to_string(),
            r.full_name(),
        ),
        None => {
            warn!(
                "Cluster led by {} has no member with a name; creating an unnamed master",
                cluster.lead()
            );
            (String::new(), String::new(), String::new())
        }
    };

    let mut identifiers: Vec<String> = Vec::new();
    for id in members.iter().filter_map(|r| r.identifier()) {
        if !identifiers.iter().any(|known| known == id) {
            identifiers.push(id.to_string());
        }
    }

    let conflict = (identifiers.len() > 1).then(|| IdentifierConflict {
        members: cluster.members.clone(),
        identifiers: identifiers.clone(),
        chosen: None,
    });

    match (conflict, policy) {
        (Some(conflict), IdentifierConflictPolicy::HoldForReview) => {
            warn!(
                "Cluster led by {} carries conflicting identifiers {:?}; holding for review",
                cluster.lead(),
                conflict.identifiers
            );
            Canonical::Hold(conflict)
        }
        (conflict, _) => {
            let external_identifier = identifiers.into_iter().next();
            let conflict = conflict.map(|mut c| {
                warn!(
                    "Cluster led by {} carries conflicting identifiers {:?}; keeping {:?}",
                    cluster.lead(),
                    c.identifiers,
                    external_identifier
                );
                c.chosen = external_identifier.clone();
                c
            });

            Canonical::Commit {
                plan: ClusterPlan {
                    members: cluster.members.clone(),
                    given_name,
                    family_name,
                    canonical_name,
                    external_identifier,
                },
                conflict,
            }
        }
    }
}
