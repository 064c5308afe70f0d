//! Social graph: friend requests, friendships and user discovery.
//!
//! Every operation here is synchronous over a locked [`Database`]; the graph
//! has no external side effects beyond in-app notifications.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use friendnest_shared::constants::{FRIEND_REQUEST_HISTORY_LIMIT, USER_SEARCH_LIMIT};
use friendnest_shared::{FriendRequestPolicy, FriendRequestStatus, NotificationType, RequestRole};
use friendnest_store::{Database, FriendRequest, User, UserSearch, UserSummary};

use crate::error::{ServerError, StoreResultExt};
use crate::notifications::notify;

const ALREADY_FRIENDS: &str = "You are already friends with this user";
const REQUEST_EXISTS: &str = "A friend request already exists between you and this user";

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWithSender {
    #[serde(flatten)]
    pub request: FriendRequest,
    pub sender: UserSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWithRecipient {
    #[serde(flatten)]
    pub request: FriendRequest,
    pub recipient: UserSummary,
}

/// An accepted request seen from one side of the friendship.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedRequest {
    #[serde(flatten)]
    pub request: FriendRequest,
    pub role: RequestRole,
    pub other_user: UserSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequests {
    pub incoming_reqs: Vec<RequestWithSender>,
    pub accepted_reqs: Vec<AcceptedRequest>,
    pub removed_reqs: Vec<RequestWithSender>,
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Send a friend request from `sender_id` to `recipient_id`.
pub fn send_friend_request(
    db: &Database,
    sender_id: Uuid,
    recipient_id: Uuid,
) -> Result<FriendRequest, ServerError> {
    if sender_id == recipient_id {
        return Err(ServerError::BadRequest(
            "You can't send friend request to yourself".into(),
        ));
    }

    let recipient = db.get_user(recipient_id).or_not_found("Recipient not found")?;
    let sender = db.get_user(sender_id).or_not_found("User not found")?;

    if db.are_friends(sender_id, recipient_id)? || db.are_friends(recipient_id, sender_id)? {
        return Err(ServerError::Conflict(ALREADY_FRIENDS.into()));
    }

    match recipient.settings.privacy.who_can_send_friend_requests {
        FriendRequestPolicy::Nobody => {
            return Err(ServerError::Forbidden(
                "This user does not accept friend requests".into(),
            ));
        }
        FriendRequestPolicy::FriendsOfFriends if !db.have_mutual_friend(sender_id, recipient_id)? => {
            return Err(ServerError::Forbidden(
                "This user only accepts friend requests from friends of friends".into(),
            ));
        }
        _ => {}
    }

    if let Some(existing) = db.find_active_request_between(sender_id, recipient_id)? {
        let message = match existing.status {
            FriendRequestStatus::Accepted => ALREADY_FRIENDS,
            _ => REQUEST_EXISTS,
        };
        return Err(ServerError::Conflict(message.into()));
    }

    let request = db
        .create_friend_request(sender_id, recipient_id)
        .or_conflict(REQUEST_EXISTS)?;

    notify(
        db,
        &recipient,
        NotificationType::FriendRequest,
        format!("{} sent you a friend request", sender.full_name),
        sender.id,
    );

    tracing::info!(request_id = %request.id, %sender_id, %recipient_id, "friend request sent");
    Ok(request)
}

/// Accept a pending request. Only its recipient may do so.
pub fn accept_friend_request(
    db: &Database,
    request_id: Uuid,
    acting_user_id: Uuid,
) -> Result<FriendRequest, ServerError> {
    let request = db
        .get_friend_request(request_id)
        .or_not_found("Friend request not found")?;

    if request.recipient_id != acting_user_id {
        return Err(ServerError::Forbidden(
            "You are not authorized to accept this request".into(),
        ));
    }
    if request.status != FriendRequestStatus::Pending {
        return Err(ServerError::Conflict(
            "This friend request is no longer pending".into(),
        ));
    }

    let recipient = db.get_user(acting_user_id).or_not_found("User not found")?;
    let accepted = db
        .accept_friend_request(request_id)
        .or_conflict("This friend request is no longer pending")?;

    if let Ok(sender) = db.get_user(request.sender_id) {
        notify(
            db,
            &sender,
            NotificationType::FriendAccepted,
            format!("{} accepted your friend request", recipient.full_name),
            recipient.id,
        );
    }

    tracing::info!(%request_id, "friend request accepted");
    Ok(accepted)
}

/// Dissolve the friendship between `acting_user_id` and `friend_id`.
pub fn remove_friend(db: &Database, acting_user_id: Uuid, friend_id: Uuid) -> Result<(), ServerError> {
    if acting_user_id == friend_id {
        return Err(ServerError::BadRequest(
            "You can't remove yourself as a friend".into(),
        ));
    }

    let friend = db.get_user(friend_id).or_not_found("Friend not found")?;
    let me = db.get_user(acting_user_id).or_not_found("User not found")?;

    if !db.are_friends(acting_user_id, friend_id)? {
        return Err(ServerError::Conflict(
            "You are not friends with this user".into(),
        ));
    }

    db.dissolve_friendship(acting_user_id, friend_id)?;

    notify(
        db,
        &friend,
        NotificationType::FriendRemoved,
        format!("{} removed you as a friend", me.full_name),
        me.id,
    );

    tracing::info!(user_id = %acting_user_id, %friend_id, "friend removed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn summaries_by_id(db: &Database, ids: Vec<Uuid>) -> Result<HashMap<Uuid, UserSummary>, ServerError> {
    let mut ids = ids;
    ids.sort();
    ids.dedup();
    Ok(db
        .user_summaries(&ids)?
        .into_iter()
        .map(|s| (s.id, s))
        .collect())
}

/// Incoming pending requests, recent accepted requests from both sides and
/// recent removal notices.
pub fn get_friend_requests(db: &Database, user_id: Uuid) -> Result<FriendRequests, ServerError> {
    let incoming = db.incoming_pending_requests(user_id)?;
    let as_sender = db.accepted_requests_as_sender(user_id, FRIEND_REQUEST_HISTORY_LIMIT)?;
    let as_recipient = db.accepted_requests_as_recipient(user_id, FRIEND_REQUEST_HISTORY_LIMIT)?;
    let removed = db.removed_requests_for_recipient(user_id, FRIEND_REQUEST_HISTORY_LIMIT)?;

    let people = summaries_by_id(
        db,
        incoming
            .iter()
            .chain(&as_sender)
            .chain(&as_recipient)
            .chain(&removed)
            .map(|r| r.other_party(user_id))
            .collect(),
    )?;

    let with_sender = |requests: Vec<FriendRequest>| -> Vec<RequestWithSender> {
        requests
            .into_iter()
            .filter_map(|request| {
                let sender = people.get(&request.sender_id)?.clone();
                Some(RequestWithSender { request, sender })
            })
            .collect()
    };

    let mut accepted: Vec<AcceptedRequest> = as_sender
        .into_iter()
        .map(|r| (r, RequestRole::Sender))
        .chain(as_recipient.into_iter().map(|r| (r, RequestRole::Recipient)))
        .filter_map(|(request, role)| {
            let other_user = people.get(&request.other_party(user_id))?.clone();
            Some(AcceptedRequest {
                request,
                role,
                other_user,
            })
        })
        .collect();
    accepted.sort_by(|a, b| b.request.updated_at.cmp(&a.request.updated_at));

    Ok(FriendRequests {
        incoming_reqs: with_sender(incoming),
        accepted_reqs: accepted,
        removed_reqs: with_sender(removed),
    })
}

/// Pending requests the user has sent.
pub fn get_outgoing_friend_requests(
    db: &Database,
    user_id: Uuid,
) -> Result<Vec<RequestWithRecipient>, ServerError> {
    with_recipients(db, db.outgoing_pending_requests(user_id)?)
}

pub(crate) fn with_senders(
    db: &Database,
    requests: Vec<FriendRequest>,
) -> Result<Vec<RequestWithSender>, ServerError> {
    let people = summaries_by_id(db, requests.iter().map(|r| r.sender_id).collect())?;
    Ok(requests
        .into_iter()
        .filter_map(|request| {
            let sender = people.get(&request.sender_id)?.clone();
            Some(RequestWithSender { request, sender })
        })
        .collect())
}

pub(crate) fn with_recipients(
    db: &Database,
    requests: Vec<FriendRequest>,
) -> Result<Vec<RequestWithRecipient>, ServerError> {
    let people = summaries_by_id(db, requests.iter().map(|r| r.recipient_id).collect())?;
    Ok(requests
        .into_iter()
        .filter_map(|request| {
            let recipient = people.get(&request.recipient_id)?.clone();
            Some(RequestWithRecipient { request, recipient })
        })
        .collect())
}

pub fn get_my_friends(db: &Database, user_id: Uuid) -> Result<Vec<UserSummary>, ServerError> {
    Ok(db.friend_summaries(user_id)?)
}

pub fn get_recommended_users(db: &Database, user_id: Uuid) -> Result<Vec<User>, ServerError> {
    Ok(db.recommended_users(user_id)?)
}

/// Directory search; the result is capped at [`USER_SEARCH_LIMIT`].
pub fn search_users(db: &Database, user_id: Uuid, search: UserSearch) -> Result<Vec<User>, ServerError> {
    let search = UserSearch {
        limit: USER_SEARCH_LIMIT,
        ..search
    };
    Ok(db.search_users(user_id, &search)?)
}
