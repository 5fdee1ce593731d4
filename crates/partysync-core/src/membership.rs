//! Membership state transitions for a single group.
//!
//! Every function here is pure: it takes the current `Group` and returns the
//! next state (or a validation failure) without touching the cache or the
//! network. The `SyncCoordinator` decides when and where results are written.
//!
//! Invariants maintained for a live group:
//! - exactly one admin, and the admin is a member of `friend_keys`
//! - attendance implies membership for anything this module adds
//!
//! When the admin leaves, the replacement is the smallest remaining member
//! key in string order, so the outcome never depends on storage order.

use serde::Deserialize;
use thiserror::Error;

use crate::models::{Group, GROUP_TYPE_PRIVATE, GROUP_TYPE_PUBLIC};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MembershipError {
    #[error("{user} is not a member of this group")]
    NotAMember { user: String },

    #[error("{user} is already a member of this group")]
    AlreadyMember { user: String },

    #[error("{user} is not authorized to perform this action")]
    NotAuthorized { user: String },

    #[error("The admin cannot remove themselves - leave the group instead")]
    CannotRemoveSelf,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result of applying an operation to a live group.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Updated(Group),
    /// Terminal: the group no longer exists.
    Deleted,
}

/// Admin-editable descriptive fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetails {
    pub name: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub group_type: Option<i32>,
    pub can_add: Option<bool>,
    pub day: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
    pub hour: Option<String>,
    pub minute: Option<String>,
}

/// A requested change to a group's membership state.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipOp {
    Invite { target: String },
    Join { user: String },
    SetAttendance { user: String, attending: bool },
    Leave { user: String },
    RemoveMember { admin: String, target: String },
    UpdateDetails { actor: String, details: GroupDetails },
    Delete { actor: String },
}

impl MembershipOp {
    pub fn apply(&self, group: &Group) -> Result<Transition, MembershipError> {
        match self {
            MembershipOp::Invite { target } => invite(group, target).map(Transition::Updated),
            MembershipOp::Join { user } => join(group, user).map(Transition::Updated),
            MembershipOp::SetAttendance { user, attending } => {
                set_attendance(group, user, *attending).map(Transition::Updated)
            }
            MembershipOp::Leave { user } => leave(group, user),
            MembershipOp::RemoveMember { admin, target } => {
                remove_member(group, admin, target).map(Transition::Updated)
            }
            MembershipOp::UpdateDetails { actor, details } => {
                update_details(group, actor, details).map(Transition::Updated)
            }
            MembershipOp::Delete { actor } => delete(group, actor),
        }
    }

    /// Short operation name for logs
    pub fn name(&self) -> &'static str {
        match self {
            MembershipOp::Invite { .. } => "invite",
            MembershipOp::Join { .. } => "join",
            MembershipOp::SetAttendance { .. } => "set_attendance",
            MembershipOp::Leave { .. } => "leave",
            MembershipOp::RemoveMember { .. } => "remove_member",
            MembershipOp::UpdateDetails { .. } => "update_details",
            MembershipOp::Delete { .. } => "delete",
        }
    }
}

fn require_key(user_key: &str) -> Result<(), MembershipError> {
    if user_key.trim().is_empty() {
        return Err(MembershipError::InvalidInput("user key must not be empty".to_string()));
    }
    // Keys become update paths (`friendKeys/<key>`)
    if user_key.contains('/') {
        return Err(MembershipError::InvalidInput(format!("user key must not contain '/': {}", user_key)));
    }
    Ok(())
}

pub fn invite(group: &Group, target: &str) -> Result<Group, MembershipError> {
    require_key(target)?;
    if group.is_member(target) {
        return Err(MembershipError::AlreadyMember { user: target.to_string() });
    }
    let mut next = group.clone();
    next.friend_keys.insert(target);
    Ok(next)
}

/// Self-service join; only public groups accept it.
pub fn join(group: &Group, user: &str) -> Result<Group, MembershipError> {
    require_key(user)?;
    if group.is_member(user) {
        return Err(MembershipError::AlreadyMember { user: user.to_string() });
    }
    if !group.is_public() {
        return Err(MembershipError::NotAuthorized { user: user.to_string() });
    }
    let mut next = group.clone();
    next.friend_keys.insert(user);
    Ok(next)
}

/// Confirming attendance requires membership; withdrawing it never fails.
pub fn set_attendance(group: &Group, user: &str, attending: bool) -> Result<Group, MembershipError> {
    require_key(user)?;
    let mut next = group.clone();
    if attending {
        if !group.is_member(user) {
            return Err(MembershipError::NotAMember { user: user.to_string() });
        }
        next.coming_keys.insert(user);
    } else {
        next.coming_keys.remove(user);
    }
    Ok(next)
}

/// The member who takes over when `departing` (the admin) leaves.
pub fn replacement_admin<'a>(group: &'a Group, departing: &str) -> Option<&'a str> {
    group.friend_keys.iter().find(|key| *key != departing)
}

pub fn leave(group: &Group, user: &str) -> Result<Transition, MembershipError> {
    if !group.is_member(user) {
        return Err(MembershipError::NotAMember { user: user.to_string() });
    }

    let mut next = group.clone();
    if group.is_admin(user) {
        let successor = match replacement_admin(group, user) {
            Some(key) => key.to_string(),
            None => return Ok(Transition::Deleted),
        };
        next.admin_key = successor;
    }
    next.friend_keys.remove(user);
    next.coming_keys.remove(user);
    Ok(Transition::Updated(next))
}

pub fn remove_member(group: &Group, admin: &str, target: &str) -> Result<Group, MembershipError> {
    if !group.is_admin(admin) {
        return Err(MembershipError::NotAuthorized { user: admin.to_string() });
    }
    if target == admin {
        return Err(MembershipError::CannotRemoveSelf);
    }
    if !group.is_member(target) {
        return Err(MembershipError::NotAMember { user: target.to_string() });
    }
    let mut next = group.clone();
    next.friend_keys.remove(target);
    next.coming_keys.remove(target);
    Ok(next)
}

pub fn update_details(group: &Group, actor: &str, details: &GroupDetails) -> Result<Group, MembershipError> {
    if !group.is_admin(actor) {
        return Err(MembershipError::NotAuthorized { user: actor.to_string() });
    }

    let mut next = group.clone();
    if let Some(name) = &details.name {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(MembershipError::InvalidInput("group name must not be empty".to_string()));
        }
        next.name = trimmed.to_string();
    }
    if let Some(group_type) = details.group_type {
        if group_type != GROUP_TYPE_PUBLIC && group_type != GROUP_TYPE_PRIVATE {
            return Err(MembershipError::InvalidInput(format!("unknown group type {}", group_type)));
        }
        next.group_type = group_type;
    }
    if let Some(can_add) = details.can_add {
        next.can_add = can_add;
    }

    let text_fields = [
        (&details.location, &mut next.location),
        (&details.description, &mut next.description),
        (&details.price, &mut next.price),
        (&details.day, &mut next.day),
        (&details.month, &mut next.month),
        (&details.year, &mut next.year),
        (&details.hour, &mut next.hour),
        (&details.minute, &mut next.minute),
    ];
    for (update, field) in text_fields {
        if let Some(value) = update {
            *field = Some(value.clone());
        }
    }
    Ok(next)
}

/// Explicit admin delete.
pub fn delete(group: &Group, actor: &str) -> Result<Transition, MembershipError> {
    if !group.is_admin(actor) {
        return Err(MembershipError::NotAuthorized { user: actor.to_string() });
    }
    Ok(Transition::Deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeySet;

    fn group(admin: &str, friends: &[&str], coming: &[&str]) -> Group {
        let mut g = Group::new("G1", "Party", admin);
        g.friend_keys = KeySet::from_iter(friends.iter().copied());
        g.coming_keys = KeySet::from_iter(coming.iter().copied());
        g
    }

    fn updated(t: Transition) -> Group {
        match t {
            Transition::Updated(g) => g,
            Transition::Deleted => panic!("expected an updated group"),
        }
    }

    #[test]
    fn test_invite_adds_member() {
        let g = group("alice", &["alice"], &[]);
        let next = invite(&g, "carol").unwrap();
        assert!(next.is_member("carol"));
        assert_eq!(next.friend_keys.len(), 2);
        assert_eq!(next.admin_key, "alice");
    }

    #[test]
    fn test_invite_existing_member_fails() {
        let g = group("alice", &["alice", "carol"], &[]);
        assert_eq!(
            invite(&g, "carol"),
            Err(MembershipError::AlreadyMember { user: "carol".into() })
        );
    }

    #[test]
    fn test_invite_invalid_key_rejected() {
        let g = group("alice", &["alice"], &[]);
        assert!(matches!(invite(&g, " "), Err(MembershipError::InvalidInput(_))));
        assert!(matches!(invite(&g, "a/b"), Err(MembershipError::InvalidInput(_))));
    }

    #[test]
    fn test_join_public_and_private() {
        let mut g = group("alice", &["alice"], &[]);
        let next = join(&g, "dan").unwrap();
        assert!(next.is_member("dan"));

        g.group_type = GROUP_TYPE_PRIVATE;
        assert_eq!(join(&g, "dan"), Err(MembershipError::NotAuthorized { user: "dan".into() }));
        assert_eq!(join(&g, "alice"), Err(MembershipError::AlreadyMember { user: "alice".into() }));
    }

    #[test]
    fn test_set_attendance_round_trip() {
        let g = group("alice", &["alice", "bob"], &["alice"]);
        let attending = set_attendance(&g, "bob", true).unwrap();
        assert!(attending.is_attending("bob"));
        let back = set_attendance(&attending, "bob", false).unwrap();
        assert_eq!(back.coming_keys, g.coming_keys);
    }

    #[test]
    fn test_set_attendance_is_idempotent() {
        let g = group("alice", &["alice", "bob"], &["bob"]);
        let once = set_attendance(&g, "bob", true).unwrap();
        let twice = set_attendance(&once, "bob", true).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, g);

        let off = set_attendance(&g, "alice", false).unwrap();
        assert_eq!(off, g);
    }

    #[test]
    fn test_attendance_requires_membership() {
        let g = group("alice", &["alice"], &["stranger"]);
        assert_eq!(
            set_attendance(&g, "zoe", true),
            Err(MembershipError::NotAMember { user: "zoe".into() })
        );
        // Stray entries can still be cleared
        let cleared = set_attendance(&g, "stranger", false).unwrap();
        assert!(cleared.coming_keys.is_empty());
    }

    #[test]
    fn test_sole_admin_leave_deletes_group() {
        let g = group("alice", &["alice"], &["alice"]);
        assert_eq!(leave(&g, "alice"), Ok(Transition::Deleted));
    }

    #[test]
    fn test_admin_leave_transfers_to_remaining_member() {
        let g = group("alice", &["alice", "bob"], &["bob"]);
        let next = updated(leave(&g, "alice").unwrap());
        assert_eq!(next.admin_key, "bob");
        assert_eq!(next.friend_keys, KeySet::from_iter(["bob"]));
        assert_eq!(next.coming_keys, KeySet::from_iter(["bob"]));
    }

    #[test]
    fn test_admin_replacement_is_smallest_key() {
        let g = group("mike", &["zed", "mike", "carl", "anna"], &[]);
        assert_eq!(replacement_admin(&g, "mike"), Some("anna"));
        let g = group("anna", &["zed", "carl", "anna"], &[]);
        assert_eq!(replacement_admin(&g, "anna"), Some("carl"));
    }

    #[test]
    fn test_admin_leave_invariants_hold_for_all_sizes() {
        let pool = ["a", "b", "c", "d", "e"];
        for size in 2..=pool.len() {
            for admin in &pool[..size] {
                let g = group(admin, &pool[..size], &pool[..size]);
                let next = updated(leave(&g, admin).unwrap());
                assert!(!next.is_member(admin));
                assert!(!next.is_attending(admin));
                assert!(next.is_member(&next.admin_key));
                assert_ne!(next.admin_key, *admin);
                assert_eq!(next.friend_keys.len(), size - 1);
            }
        }
    }

    #[test]
    fn test_member_leave_keeps_admin() {
        let g = group("alice", &["alice", "bob", "carol"], &["bob", "carol"]);
        let next = updated(leave(&g, "bob").unwrap());
        assert_eq!(next.admin_key, "alice");
        assert!(!next.is_member("bob"));
        assert!(!next.is_attending("bob"));
        assert!(next.is_attending("carol"));
    }

    #[test]
    fn test_non_member_leave_fails() {
        let g = group("alice", &["alice"], &[]);
        assert_eq!(leave(&g, "bob"), Err(MembershipError::NotAMember { user: "bob".into() }));
    }

    #[test]
    fn test_remove_member_rules() {
        let g = group("alice", &["alice", "bob"], &["bob"]);

        assert_eq!(
            remove_member(&g, "bob", "alice"),
            Err(MembershipError::NotAuthorized { user: "bob".into() })
        );
        assert_eq!(remove_member(&g, "alice", "alice"), Err(MembershipError::CannotRemoveSelf));
        assert_eq!(
            remove_member(&g, "alice", "zoe"),
            Err(MembershipError::NotAMember { user: "zoe".into() })
        );

        let next = remove_member(&g, "alice", "bob").unwrap();
        assert!(!next.is_member("bob"));
        assert!(!next.is_attending("bob"));
        assert_eq!(next.admin_key, "alice");
    }

    #[test]
    fn test_update_details() {
        let g = group("alice", &["alice", "bob"], &[]);
        let details = GroupDetails {
            name: Some("  Rooftop  ".into()),
            location: Some("Haifa".into()),
            group_type: Some(GROUP_TYPE_PRIVATE),
            can_add: Some(true),
            ..Default::default()
        };

        assert_eq!(
            update_details(&g, "bob", &details),
            Err(MembershipError::NotAuthorized { user: "bob".into() })
        );

        let next = update_details(&g, "alice", &details).unwrap();
        assert_eq!(next.name, "Rooftop");
        assert_eq!(next.location.as_deref(), Some("Haifa"));
        assert!(!next.is_public());
        assert!(next.can_add);
        assert_eq!(next.friend_keys, g.friend_keys);
    }

    #[test]
    fn test_update_details_validation() {
        let g = group("alice", &["alice"], &[]);
        let blank = GroupDetails { name: Some("   ".into()), ..Default::default() };
        assert!(matches!(update_details(&g, "alice", &blank), Err(MembershipError::InvalidInput(_))));

        let bad_type = GroupDetails { group_type: Some(7), ..Default::default() };
        assert!(matches!(update_details(&g, "alice", &bad_type), Err(MembershipError::InvalidInput(_))));
    }

    #[test]
    fn test_delete_requires_admin() {
        let g = group("alice", &["alice", "bob"], &[]);
        assert_eq!(delete(&g, "alice"), Ok(Transition::Deleted));
        assert_eq!(delete(&g, "bob"), Err(MembershipError::NotAuthorized { user: "bob".into() }));
    }

    #[test]
    fn test_op_dispatch() {
        let g = group("alice", &["alice"], &[]);
        let op = MembershipOp::Invite { target: "bob".into() };
        assert_eq!(op.name(), "invite");
        let next = updated(op.apply(&g).unwrap());
        assert!(next.is_member("bob"));

        let op = MembershipOp::Leave { user: "alice".into() };
        assert_eq!(op.apply(&g), Ok(Transition::Deleted));
    }
}
