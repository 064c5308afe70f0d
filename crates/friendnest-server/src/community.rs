//! Language groups and their events.
//!
//! Membership changes are committed to the store first; the matching chat
//! channel is then updated best-effort with the database lock released.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use friendnest_shared::group_channel_id;
use friendnest_shared::validation::{non_blank, parse_event_date};
use friendnest_store::{
    Database, Event, Group, GroupFilter, GroupUpdate, NewEvent, NewGroup, User, UserSummary,
};

use crate::api::AppState;
use crate::error::{ServerError, StoreResultExt};

const GROUP_NOT_FOUND: &str = "Group not found";
const EVENT_NOT_FOUND: &str = "Event not found";

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GroupQuery {
    pub language: Option<String>,
    pub search: Option<String>,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// A group as shown in listings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCard {
    #[serde(flatten)]
    pub group: Group,
    pub member_count: usize,
    pub is_member: bool,
}

impl GroupCard {
    fn new(group: Group, viewer: Uuid) -> Self {
        Self {
            member_count: group.members.len(),
            is_member: group.is_member(viewer),
            group,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    pub id: Uuid,
    pub group_id: Uuid,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub organizer: Option<UserSummary>,
    pub attendees: Vec<UserSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A group with its people and events resolved, seen by one viewer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetail {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub language: String,
    pub cover_image: String,
    pub stream_channel_id: String,
    pub creator: Option<UserSummary>,
    pub members: Vec<UserSummary>,
    pub events: Vec<EventDetail>,
    pub member_count: usize,
    pub is_member: bool,
    pub is_creator: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn group_detail(db: &Database, group: Group, viewer: Uuid) -> Result<GroupDetail, ServerError> {
    let events = db.events_for_group(group.id)?;

    let mut ids: Vec<Uuid> = group
        .members
        .iter()
        .copied()
        .chain(std::iter::once(group.creator_id))
        .chain(events.iter().flat_map(|e| e.attendees.iter().copied()))
        .chain(events.iter().map(|e| e.organizer_id))
        .collect();
    ids.sort();
    ids.dedup();
    let people: HashMap<Uuid, UserSummary> = db
        .user_summaries(&ids)?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    let resolve = |ids: &[Uuid]| -> Vec<UserSummary> {
        ids.iter().filter_map(|id| people.get(id).cloned()).collect()
    };

    let events = events
        .into_iter()
        .map(|event| EventDetail {
            organizer: people.get(&event.organizer_id).cloned(),
            attendees: resolve(&event.attendees),
            id: event.id,
            group_id: event.group_id,
            title: event.title,
            description: event.description,
            date: event.date,
            location: event.location,
            created_at: event.created_at,
            updated_at: event.updated_at,
        })
        .collect();

    Ok(GroupDetail {
        creator: people.get(&group.creator_id).cloned(),
        members: resolve(&group.members),
        events,
        member_count: group.members.len(),
        is_member: group.is_member(viewer),
        is_creator: group.creator_id == viewer,
        id: group.id,
        name: group.name,
        description: group.description,
        language: group.language,
        cover_image: group.cover_image,
        stream_channel_id: group.stream_channel_id,
        created_at: group.created_at,
        updated_at: group.updated_at,
    })
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Create a group with `creator` as its first member and provision its chat
/// channel. A channel failure leaves the channel id empty; it is repaired
/// on the next detail fetch.
pub async fn create_group(state: &AppState, creator: &User, input: GroupInput) -> Result<Group, ServerError> {
    let (Some(name), Some(language)) = (
        non_blank(input.name.as_deref()),
        non_blank(input.language.as_deref()),
    ) else {
        return Err(ServerError::BadRequest("Name and language are required".into()));
    };

    let mut group = {
        let db = state.db()?;
        db.create_group(&NewGroup {
            name,
            description: input.description.unwrap_or_default().trim().to_string(),
            language,
            cover_image: input.cover_image.unwrap_or_default(),
            creator_id: creator.id,
        })?
    };
    tracing::info!(group_id = %group.id, creator_id = %creator.id, "group created");

    let channel_id = group_channel_id(&group.id);
    if state
        .chat
        .create_channel(&channel_id, &group.name, creator.id, &group.members)
        .await
    {
        state.db()?.set_stream_channel_id(group.id, &channel_id)?;
        group.stream_channel_id = channel_id;
    }

    Ok(group)
}

/// Fetch a group for `viewer`, provisioning its chat channel if an earlier
/// attempt failed.
pub async fn get_group(state: &AppState, viewer: &User, group_id: Uuid) -> Result<GroupDetail, ServerError> {
    let mut group = {
        let db = state.db()?;
        db.get_group(group_id).or_not_found(GROUP_NOT_FOUND)?
    };

    if group.stream_channel_id.is_empty() && state.chat.is_enabled() {
        let channel_id = group_channel_id(&group.id);
        if state
            .chat
            .create_channel(&channel_id, &group.name, group.creator_id, &group.members)
            .await
        {
            state.db()?.set_stream_channel_id(group.id, &channel_id)?;
            tracing::info!(group_id = %group.id, "chat channel repaired");
            group.stream_channel_id = channel_id;
        }
    }

    let db = state.db()?;
    group_detail(&db, group, viewer.id)
}

pub fn list_groups(db: &Database, viewer: Uuid, query: GroupQuery) -> Result<Vec<GroupCard>, ServerError> {
    let filter = GroupFilter {
        language: non_blank(query.language.as_deref()),
        search: non_blank(query.search.as_deref()),
    };
    Ok(db
        .list_groups(&filter)?
        .into_iter()
        .map(|g| GroupCard::new(g, viewer))
        .collect())
}

pub fn my_groups(db: &Database, viewer: Uuid) -> Result<Vec<GroupCard>, ServerError> {
    Ok(db
        .groups_for_member(viewer)?
        .into_iter()
        .map(|g| GroupCard::new(g, viewer))
        .collect())
}

pub async fn join_group(state: &AppState, user: &User, group_id: Uuid) -> Result<Group, ServerError> {
    let group = {
        let db = state.db()?;
        let group = db.get_group(group_id).or_not_found(GROUP_NOT_FOUND)?;
        if group.is_member(user.id) {
            return Err(ServerError::Conflict(
                "You are already a member of this group".into(),
            ));
        }
        db.add_group_member(group_id, user.id)
            .or_conflict("You are already a member of this group")?;
        db.get_group(group_id)?
    };
    tracing::info!(%group_id, user_id = %user.id, "joined group");

    state.chat.add_member(&group.stream_channel_id, user.id).await;
    Ok(group)
}

pub async fn leave_group(state: &AppState, user: &User, group_id: Uuid) -> Result<(), ServerError> {
    let channel_id = {
        let db = state.db()?;
        let group = db.get_group(group_id).or_not_found(GROUP_NOT_FOUND)?;
        if group.creator_id == user.id {
            return Err(ServerError::BadRequest(
                "Group creator cannot leave the group. Delete the group instead.".into(),
            ));
        }
        if !db.remove_group_member(group_id, user.id)? {
            return Err(ServerError::BadRequest(
                "You are not a member of this group".into(),
            ));
        }
        group.stream_channel_id
    };
    tracing::info!(%group_id, user_id = %user.id, "left group");

    state.chat.remove_member(&channel_id, user.id).await;
    Ok(())
}

pub async fn update_group(
    state: &AppState,
    user: &User,
    group_id: Uuid,
    input: GroupInput,
) -> Result<GroupDetail, ServerError> {
    let name = non_blank(input.name.as_deref());
    let group = {
        let db = state.db()?;
        let group = db.get_group(group_id).or_not_found(GROUP_NOT_FOUND)?;
        if group.creator_id != user.id {
            return Err(ServerError::Forbidden(
                "Only the group creator can update the group".into(),
            ));
        }
        db.update_group(
            group_id,
            &GroupUpdate {
                name: name.clone(),
                description: input.description.map(|d| d.trim().to_string()),
                language: non_blank(input.language.as_deref()),
                cover_image: input.cover_image,
            },
        )?
    };

    if let Some(name) = &name {
        state.chat.rename_channel(&group.stream_channel_id, name).await;
    }

    let db = state.db()?;
    group_detail(&db, group, user.id)
}

/// Delete a group. Allowed for its creator and for administrators.
pub async fn delete_group(state: &AppState, user: &User, group_id: Uuid) -> Result<(), ServerError> {
    let group = {
        let db = state.db()?;
        db.get_group(group_id).or_not_found(GROUP_NOT_FOUND)?
    };
    if group.creator_id != user.id && !user.role.is_admin() {
        return Err(ServerError::Forbidden(
            "Only the group creator can delete the group".into(),
        ));
    }

    state.chat.delete_channel(&group.stream_channel_id).await;
    state.db()?.delete_group(group_id)?;
    tracing::info!(%group_id, deleted_by = %user.id, "group deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub fn create_event(db: &Database, user: &User, group_id: Uuid, input: EventInput) -> Result<Event, ServerError> {
    let (Some(title), Some(date)) = (
        non_blank(input.title.as_deref()),
        non_blank(input.date.as_deref()),
    ) else {
        return Err(ServerError::BadRequest("Title and date are required".into()));
    };
    let date = parse_event_date(&date)?;

    let group = db.get_group(group_id).or_not_found(GROUP_NOT_FOUND)?;
    if !group.is_member(user.id) {
        return Err(ServerError::Forbidden(
            "You must be a member of the group to create events".into(),
        ));
    }

    let event = db.create_event(&NewEvent {
        group_id,
        title,
        description: input.description.unwrap_or_default().trim().to_string(),
        date,
        location: input.location.unwrap_or_default().trim().to_string(),
        organizer_id: user.id,
    })?;
    tracing::info!(event_id = %event.id, %group_id, organizer_id = %user.id, "event created");
    Ok(event)
}

fn load_event(db: &Database, group_id: Uuid, event_id: Uuid) -> Result<Event, ServerError> {
    db.get_group(group_id).or_not_found(GROUP_NOT_FOUND)?;
    db.get_event(group_id, event_id).or_not_found(EVENT_NOT_FOUND)
}

pub fn join_event(db: &Database, user: &User, group_id: Uuid, event_id: Uuid) -> Result<Event, ServerError> {
    let event = load_event(db, group_id, event_id)?;
    if event.is_attending(user.id) {
        return Err(ServerError::Conflict(
            "You are already attending this event".into(),
        ));
    }
    db.add_event_attendee(event_id, user.id)
        .or_conflict("You are already attending this event")?;
    Ok(db.get_event(group_id, event_id)?)
}

pub fn leave_event(db: &Database, user: &User, group_id: Uuid, event_id: Uuid) -> Result<(), ServerError> {
    let event = load_event(db, group_id, event_id)?;
    if event.organizer_id == user.id {
        return Err(ServerError::BadRequest(
            "The organizer cannot leave their own event".into(),
        ));
    }
    if !db.remove_event_attendee(event_id, user.id)? {
        return Err(ServerError::BadRequest(
            "You are not attending this event".into(),
        ));
    }
    Ok(())
}

pub fn delete_event(db: &Database, user: &User, group_id: Uuid, event_id: Uuid) -> Result<(), ServerError> {
    let event = load_event(db, group_id, event_id)?;
    if event.organizer_id != user.id {
        return Err(ServerError::Forbidden(
            "Only the event organizer can delete the event".into(),
        ));
    }
    db.delete_event(event_id)?;
    tracing::info!(%event_id, %group_id, "event deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chat::fake::RecordingProvider;
    use crate::testing::{state, state_with, user};
    use friendnest_shared::Role;

    fn spanish(name: &str) -> GroupInput {
        GroupInput {
            name: Some(format!("  {name}  ")),
            language: Some("Spanish".into()),
            ..Default::default()
        }
    }

    fn event(title: &str, date: &str) -> EventInput {
        EventInput {
            title: Some(title.into()),
            date: Some(date.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_group_provisions_channel() {
        let (state, chat) = state();
        let ana = user(&state.db().unwrap(), "Ana");

        let group = create_group(&state, &ana, spanish("Tapas")).await.unwrap();
        assert_eq!(group.name, "Tapas");
        assert_eq!(group.members, vec![ana.id]);
        assert_eq!(group.stream_channel_id, group_channel_id(&group.id));
        assert_eq!(
            chat.calls(),
            vec![format!("create_channel {} 1", group_channel_id(&group.id))]
        );

        let stored = state.db().unwrap().get_group(group.id).unwrap();
        assert_eq!(stored.stream_channel_id, group.stream_channel_id);
    }

    #[tokio::test]
    async fn test_create_group_requires_name_and_language() {
        let (state, _) = state();
        let ana = user(&state.db().unwrap(), "Ana");

        let input = GroupInput {
            name: Some("   ".into()),
            language: Some("Spanish".into()),
            ..Default::default()
        };
        assert!(matches!(
            create_group(&state, &ana, input).await,
            Err(ServerError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_channel_failure_is_repaired_on_fetch() {
        let failing = Arc::new(RecordingProvider::failing());
        let state = state_with(failing);
        let ana = user(&state.db().unwrap(), "Ana");

        let group = create_group(&state, &ana, spanish("Tapas")).await.unwrap();
        assert!(group.stream_channel_id.is_empty());

        // Still failing: the fetch succeeds without a channel.
        let detail = get_group(&state, &ana, group.id).await.unwrap();
        assert!(detail.stream_channel_id.is_empty());
        assert!(detail.is_creator);

        // A healthy provider repairs it.
        let (healthy, chat) = state_with_db(&state);
        let detail = get_group(&healthy, &ana, group.id).await.unwrap();
        assert_eq!(detail.stream_channel_id, group_channel_id(&group.id));
        assert_eq!(chat.calls().len(), 1);
    }

    /// The same database behind a fresh, healthy chat fake.
    fn state_with_db(other: &AppState) -> (AppState, Arc<RecordingProvider>) {
        let (mut fresh, chat) = state();
        fresh.db = other.db.clone();
        (fresh, chat)
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let (state, chat) = state();
        let (ana, ben) = {
            let db = state.db().unwrap();
            (user(&db, "Ana"), user(&db, "Ben"))
        };
        let group = create_group(&state, &ana, spanish("Tapas")).await.unwrap();

        let joined = join_group(&state, &ben, group.id).await.unwrap();
        assert_eq!(joined.members, vec![ana.id, ben.id]);
        assert!(matches!(
            join_group(&state, &ben, group.id).await,
            Err(ServerError::Conflict(_))
        ));

        let detail = get_group(&state, &ben, group.id).await.unwrap();
        assert_eq!(detail.member_count, 2);
        assert!(detail.is_member);
        assert!(!detail.is_creator);
        assert_eq!(detail.members[1].full_name, "Ben");

        leave_group(&state, &ben, group.id).await.unwrap();
        assert!(matches!(
            leave_group(&state, &ben, group.id).await,
            Err(ServerError::BadRequest(_))
        ));
        assert!(matches!(
            leave_group(&state, &ana, group.id).await,
            Err(ServerError::BadRequest(_))
        ));

        let channel = group_channel_id(&group.id);
        let calls = chat.calls();
        assert!(calls.contains(&format!("add_members {channel} {}", ben.id)));
        assert!(calls.contains(&format!("remove_members {channel} {}", ben.id)));
    }

    #[tokio::test]
    async fn test_missing_group_is_not_found() {
        let (state, _) = state();
        let ana = user(&state.db().unwrap(), "Ana");
        let ghost = Uuid::new_v4();

        assert!(matches!(
            get_group(&state, &ana, ghost).await,
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            join_group(&state, &ana, ghost).await,
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            leave_group(&state, &ana, ghost).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_is_creator_only_and_renames_channel() {
        let (state, chat) = state();
        let (ana, ben) = {
            let db = state.db().unwrap();
            (user(&db, "Ana"), user(&db, "Ben"))
        };
        let group = create_group(&state, &ana, spanish("Tapas")).await.unwrap();

        let rename = GroupInput {
            name: Some(" Paella ".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_group(&state, &ben, group.id, rename.clone()).await,
            Err(ServerError::Forbidden(_))
        ));

        let updated = update_group(&state, &ana, group.id, rename).await.unwrap();
        assert_eq!(updated.name, "Paella");
        assert_eq!(updated.language, "Spanish");
        assert!(chat
            .calls()
            .contains(&format!("rename_channel {} Paella", group_channel_id(&group.id))));
    }

    #[tokio::test]
    async fn test_delete_group_by_creator_or_admin() {
        let (state, chat) = state();
        let (ana, ben, root) = {
            let db = state.db().unwrap();
            let root = user(&db, "Root");
            db.set_role(root.id, Role::Admin).unwrap();
            (user(&db, "Ana"), user(&db, "Ben"), db.get_user(root.id).unwrap())
        };
        let first = create_group(&state, &ana, spanish("Tapas")).await.unwrap();
        let second = create_group(&state, &ana, spanish("Paella")).await.unwrap();
        create_event(&state.db().unwrap(), &ana, first.id, event("Meetup", "2030-01-01")).unwrap();

        assert!(matches!(
            delete_group(&state, &ben, first.id).await,
            Err(ServerError::Forbidden(_))
        ));
        delete_group(&state, &ana, first.id).await.unwrap();
        delete_group(&state, &root, second.id).await.unwrap();

        let db = state.db().unwrap();
        assert!(db.events_for_group(first.id).unwrap().is_empty());
        assert!(matches!(db.get_group(second.id), Err(friendnest_store::StoreError::NotFound)));
        assert!(chat
            .calls()
            .contains(&format!("delete_channel {}", group_channel_id(&first.id))));
    }

    #[tokio::test]
    async fn test_list_and_my_groups() {
        let (state, _) = state();
        let (ana, ben) = {
            let db = state.db().unwrap();
            (user(&db, "Ana"), user(&db, "Ben"))
        };
        let tapas = create_group(&state, &ana, spanish("Tapas")).await.unwrap();
        let kaffee = create_group(
            &state,
            &ben,
            GroupInput {
                name: Some("Kaffee".into()),
                language: Some("German".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let db = state.db().unwrap();
        let all = list_groups(&db, ana.id, GroupQuery::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].group.id, kaffee.id);
        assert!(!all[0].is_member);
        assert!(all[1].is_member);

        let german = list_groups(
            &db,
            ana.id,
            GroupQuery {
                language: Some("German".into()),
                search: None,
            },
        )
        .unwrap();
        assert_eq!(german.len(), 1);

        let mine = my_groups(&db, ana.id).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].group.id, tapas.id);
        assert_eq!(mine[0].member_count, 1);
    }

    #[tokio::test]
    async fn test_event_lifecycle() {
        let (state, _) = state();
        let (ana, ben, cleo) = {
            let db = state.db().unwrap();
            (user(&db, "Ana"), user(&db, "Ben"), user(&db, "Cleo"))
        };
        let group = create_group(&state, &ana, spanish("Tapas")).await.unwrap();
        join_group(&state, &ben, group.id).await.unwrap();

        let db = state.db().unwrap();
        assert!(matches!(
            create_event(&db, &cleo, group.id, event("Meetup", "2030-01-01")),
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            create_event(&db, &ana, group.id, EventInput { title: Some("x".into()), ..Default::default() }),
            Err(ServerError::BadRequest(_))
        ));
        assert!(matches!(
            create_event(&db, &ana, group.id, event("Meetup", "someday")),
            Err(ServerError::BadRequest(_))
        ));

        // Past dates are accepted.
        create_event(&db, &ana, group.id, event("Retro", "2001-05-04")).unwrap();
        let meetup = create_event(&db, &ana, group.id, event("Meetup", "2030-01-01T18:30")).unwrap();
        assert_eq!(meetup.attendees, vec![ana.id]);

        let joined = join_event(&db, &ben, group.id, meetup.id).unwrap();
        assert_eq!(joined.attendees, vec![ana.id, ben.id]);
        assert!(matches!(
            join_event(&db, &ben, group.id, meetup.id),
            Err(ServerError::Conflict(_))
        ));

        leave_event(&db, &ben, group.id, meetup.id).unwrap();
        assert!(matches!(
            leave_event(&db, &ben, group.id, meetup.id),
            Err(ServerError::BadRequest(_))
        ));
        assert!(matches!(
            leave_event(&db, &ana, group.id, meetup.id),
            Err(ServerError::BadRequest(_))
        ));

        assert!(matches!(
            delete_event(&db, &ben, group.id, meetup.id),
            Err(ServerError::Forbidden(_))
        ));
        delete_event(&db, &ana, group.id, meetup.id).unwrap();
        assert!(matches!(
            join_event(&db, &ben, group.id, meetup.id),
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_event_from_other_group_is_not_found() {
        let (state, _) = state();
        let ana = user(&state.db().unwrap(), "Ana");
        let tapas = create_group(&state, &ana, spanish("Tapas")).await.unwrap();
        let paella = create_group(&state, &ana, spanish("Paella")).await.unwrap();

        let db = state.db().unwrap();
        let meetup = create_event(&db, &ana, tapas.id, event("Meetup", "2030-01-01")).unwrap();
        assert!(matches!(
            delete_event(&db, &ana, paella.id, meetup.id),
            Err(ServerError::NotFound(m)) if m == EVENT_NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn test_detail_resolves_events() {
        let (state, _) = state();
        let ana = user(&state.db().unwrap(), "Ana");
        let group = create_group(&state, &ana, spanish("Tapas")).await.unwrap();
        create_event(&state.db().unwrap(), &ana, group.id, event("Meetup", "2030-01-01")).unwrap();

        let detail = get_group(&state, &ana, group.id).await.unwrap();
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["memberCount"], 1);
        assert_eq!(json["creator"]["fullName"], "Ana");
        assert_eq!(json["events"][0]["organizer"]["fullName"], "Ana");
        assert_eq!(json["events"][0]["attendees"][0]["fullName"], "Ana");
    }
}
