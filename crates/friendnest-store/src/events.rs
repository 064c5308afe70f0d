//! CRUD operations for group [`Event`] records and their RSVPs.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Event, NewEvent};
use crate::sql::{parse_ts, parse_uuid, ts};

const EVENT_COLUMNS: &str =
    "id, group_id, title, description, date, location, organizer_id, created_at, updated_at";

impl Database {
    /// Insert an event with its organizer as the first attendee.
    pub fn create_event(&self, new: &NewEvent) -> Result<Event> {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            group_id: new.group_id,
            title: new.title.clone(),
            description: new.description.clone(),
            date: new.date,
            location: new.location.clone(),
            organizer_id: new.organizer_id,
            attendees: vec![new.organizer_id],
            created_at: now,
            updated_at: now,
        };

        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO events ({EVENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                event.id.to_string(),
                event.group_id.to_string(),
                event.title,
                event.description,
                ts(&event.date),
                event.location,
                event.organizer_id.to_string(),
                ts(&now),
                ts(&now),
            ],
        )?;
        tx.execute(
            "INSERT INTO event_attendees (event_id, user_id) VALUES (?1, ?2)",
            params![event.id.to_string(), event.organizer_id.to_string()],
        )?;
        tx.execute(
            "UPDATE social_groups SET updated_at = ?2 WHERE id = ?1",
            params![event.group_id.to_string(), ts(&now)],
        )?;
        tx.commit()?;

        tracing::debug!(event_id = %event.id, group_id = %event.group_id, "event created");
        Ok(event)
    }

    /// The event `event_id` if it belongs to `group_id`.
    pub fn get_event(&self, group_id: Uuid, event_id: Uuid) -> Result<Event> {
        let mut event = self.conn().query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1 AND group_id = ?2"),
            params![event_id.to_string(), group_id.to_string()],
            row_to_event,
        )?;
        event.attendees = self.event_attendee_ids(event_id)?;
        Ok(event)
    }

    /// Events of a group in chronological order.
    pub fn events_for_group(&self, group_id: Uuid) -> Result<Vec<Event>> {
        let mut events = {
            let mut stmt = self.conn().prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE group_id = ?1
                 ORDER BY date ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map(params![group_id.to_string()], row_to_event)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        for event in &mut events {
            event.attendees = self.event_attendee_ids(event.id)?;
        }
        Ok(events)
    }

    /// Attendee ids in RSVP order.
    pub fn event_attendee_ids(&self, event_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_id FROM event_attendees WHERE event_id = ?1 ORDER BY rowid ASC")?;
        let rows = stmt.query_map(params![event_id.to_string()], |row| {
            let id: String = row.get(0)?;
            parse_uuid(0, &id)
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    /// RSVP `user_id`. A repeated RSVP is a [`StoreError::Conflict`].
    pub fn add_event_attendee(&self, event_id: Uuid, user_id: Uuid) -> Result<()> {
        self.conn().execute(
            "INSERT INTO event_attendees (event_id, user_id) VALUES (?1, ?2)",
            params![event_id.to_string(), user_id.to_string()],
        )?;
        self.touch_event(event_id)
    }

    /// Returns `true` if an RSVP was removed.
    pub fn remove_event_attendee(&self, event_id: Uuid, user_id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM event_attendees WHERE event_id = ?1 AND user_id = ?2",
            params![event_id.to_string(), user_id.to_string()],
        )?;
        if affected > 0 {
            self.touch_event(event_id)?;
        }
        Ok(affected > 0)
    }

    pub fn delete_event(&self, event_id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM events WHERE id = ?1", params![event_id.to_string()])?;
        Ok(affected > 0)
    }

    /// Count events whose date is after (`upcoming`) or not after `now`.
    pub fn count_events_relative_to(&self, now: DateTime<Utc>, upcoming: bool) -> Result<u64> {
        let sql = if upcoming {
            "SELECT COUNT(*) FROM events WHERE date > ?1"
        } else {
            "SELECT COUNT(*) FROM events WHERE date <= ?1"
        };
        let count: i64 = self.conn().query_row(sql, params![ts(&now)], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn touch_event(&self, event_id: Uuid) -> Result<()> {
        self.conn().execute(
            "UPDATE events SET updated_at = ?2 WHERE id = ?1",
            params![event_id.to_string(), ts(&Utc::now())],
        )?;
        Ok(())
    }
}

pub(crate) fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let id: String = row.get(0)?;
    let group_id: String = row.get(1)?;
    let date: String = row.get(4)?;
    let organizer: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Event {
        id: parse_uuid(0, &id)?,
        group_id: parse_uuid(1, &group_id)?,
        title: row.get(2)?,
        description: row.get(3)?,
        date: parse_ts(4, &date)?,
        location: row.get(5)?,
        organizer_id: parse_uuid(6, &organizer)?,
        attendees: Vec::new(),
        created_at: parse_ts(7, &created_at)?,
        updated_at: parse_ts(8, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::groups::tests::new_group;
    use crate::users::tests::new_user;

    fn meetup(group_id: Uuid, organizer_id: Uuid, date: DateTime<Utc>) -> NewEvent {
        NewEvent {
            group_id,
            title: "Meetup".into(),
            description: "Coffee and conversation".into(),
            date,
            location: "Cafe".into(),
            organizer_id,
        }
    }

    #[test]
    fn organizer_is_first_attendee() {
        let db = Database::open_in_memory().unwrap();
        let ana = new_user(&db, "Ana");
        let group = new_group(&db, ana.id, "Club", "spanish");

        let event = db.create_event(&meetup(group.id, ana.id, Utc::now())).unwrap();
        let loaded = db.get_event(group.id, event.id).unwrap();
        assert_eq!(loaded.attendees, vec![ana.id]);
        assert_eq!(loaded.title, "Meetup");
    }

    #[test]
    fn event_from_another_group_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let ana = new_user(&db, "Ana");
        let g1 = new_group(&db, ana.id, "One", "spanish");
        let g2 = new_group(&db, ana.id, "Two", "spanish");

        let event = db.create_event(&meetup(g1.id, ana.id, Utc::now())).unwrap();
        assert!(matches!(
            db.get_event(g2.id, event.id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn rsvp_twice_is_conflict() {
        let db = Database::open_in_memory().unwrap();
        let ana = new_user(&db, "Ana");
        let ben = new_user(&db, "Ben");
        let group = new_group(&db, ana.id, "Club", "spanish");
        let event = db.create_event(&meetup(group.id, ana.id, Utc::now())).unwrap();

        db.add_event_attendee(event.id, ben.id).unwrap();
        assert!(matches!(
            db.add_event_attendee(event.id, ben.id),
            Err(StoreError::Conflict(_))
        ));

        assert!(db.remove_event_attendee(event.id, ben.id).unwrap());
        assert!(!db.remove_event_attendee(event.id, ben.id).unwrap());
    }

    #[test]
    fn events_are_ordered_by_date_and_counted() {
        let db = Database::open_in_memory().unwrap();
        let ana = new_user(&db, "Ana");
        let group = new_group(&db, ana.id, "Club", "spanish");
        let now = Utc::now();

        db.create_event(&meetup(group.id, ana.id, now + Duration::days(3)))
            .unwrap();
        db.create_event(&meetup(group.id, ana.id, now - Duration::days(3)))
            .unwrap();

        let events = db.events_for_group(group.id).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].date < events[1].date);

        assert_eq!(db.count_events_relative_to(now, true).unwrap(), 1);
        assert_eq!(db.count_events_relative_to(now, false).unwrap(), 1);

        assert!(db.delete_event(events[0].id).unwrap());
        assert_eq!(db.events_for_group(group.id).unwrap().len(), 1);
    }
}
