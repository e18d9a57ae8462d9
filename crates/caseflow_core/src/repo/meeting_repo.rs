//! Meeting repository contracts and SQLite implementation.
//!
//! # Invariants
//! - A meeting row and its participant rows are written together.
//! - Listing order is deterministic: `starts_at ASC, id ASC`.

use crate::model::case::CaseId;
use crate::model::directory::UserId;
use crate::model::meeting::{
    Meeting, MeetingId, MeetingParticipant, MeetingStatus, ParticipantResponse,
};
use crate::repo::{parse_enum, parse_optional_uuid, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const MEETING_SELECT_SQL: &str = "SELECT
    m.id,
    m.case_id,
    m.organizer_id,
    m.title,
    m.agenda,
    m.location,
    m.starts_at,
    m.ends_at,
    m.status,
    m.created_at,
    m.updated_at
FROM meetings m";

/// Time window and filters for meeting listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeetingWindow {
    /// Inclusive lower bound on `ends_at`.
    pub from: Option<i64>,
    /// Exclusive upper bound on `starts_at`.
    pub to: Option<i64>,
    pub include_cancelled: bool,
}

/// Repository interface for meeting operations.
pub trait MeetingRepository {
    fn insert_meeting(&self, meeting: &Meeting) -> RepoResult<()>;
    /// Updates meeting columns only; participants are managed separately.
    fn update_meeting(&self, meeting: &Meeting) -> RepoResult<()>;
    fn get_meeting(&self, id: MeetingId) -> RepoResult<Option<Meeting>>;
    fn list_for_user(&self, user_id: UserId, window: &MeetingWindow) -> RepoResult<Vec<Meeting>>;
    fn list_for_case(&self, case_id: CaseId, window: &MeetingWindow) -> RepoResult<Vec<Meeting>>;
    fn add_participant(&self, id: MeetingId, user_id: UserId) -> RepoResult<()>;
    fn set_response(
        &self,
        id: MeetingId,
        user_id: UserId,
        response: ParticipantResponse,
        responded_at: i64,
    ) -> RepoResult<()>;
    /// Resets every response to `pending`, e.g. after a reschedule.
    fn reset_responses(&self, id: MeetingId) -> RepoResult<()>;
}

/// SQLite-backed meeting repository.
pub struct SqliteMeetingRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMeetingRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn load_participants(&self, id: MeetingId) -> RepoResult<Vec<MeetingParticipant>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, response, responded_at
             FROM meeting_participants
             WHERE meeting_id = ?1
             ORDER BY user_id ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut participants = Vec::new();
        while let Some(row) = rows.next()? {
            let user_text: String = row.get("user_id")?;
            let response_text: String = row.get("response")?;
            participants.push(MeetingParticipant {
                user_id: parse_uuid(&user_text, "meeting_participants.user_id")?,
                response: parse_enum(
                    &response_text,
                    "meeting_participants.response",
                    ParticipantResponse::parse,
                )?,
                responded_at: row.get("responded_at")?,
            });
        }
        Ok(participants)
    }

    fn query_meetings(
        &self,
        predicate: &str,
        key: String,
        window: &MeetingWindow,
    ) -> RepoResult<Vec<Meeting>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MEETING_SELECT_SQL}
             WHERE {predicate}
               AND (?2 IS NULL OR m.ends_at >= ?2)
               AND (?3 IS NULL OR m.starts_at < ?3)
               AND (?4 = 1 OR m.status <> 'cancelled')
             ORDER BY m.starts_at ASC, m.id ASC;"
        ))?;
        let mut rows = stmt.query(params![
            key,
            window.from,
            window.to,
            i64::from(window.include_cancelled),
        ])?;
        let mut meetings = Vec::new();
        while let Some(row) = rows.next()? {
            meetings.push(parse_meeting_row(row)?);
        }
        drop(rows);
        drop(stmt);

        for meeting in &mut meetings {
            meeting.participants = self.load_participants(meeting.id)?;
        }
        Ok(meetings)
    }
}

impl MeetingRepository for SqliteMeetingRepository<'_> {
    fn insert_meeting(&self, meeting: &Meeting) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO meetings (
                id,
                case_id,
                organizer_id,
                title,
                agenda,
                location,
                starts_at,
                ends_at,
                status,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                meeting.id.to_string(),
                meeting.case_id.map(|id| id.to_string()),
                meeting.organizer_id.to_string(),
                meeting.title.as_str(),
                meeting.agenda.as_deref(),
                meeting.location.as_deref(),
                meeting.starts_at,
                meeting.ends_at,
                meeting.status.as_str(),
                meeting.created_at,
                meeting.updated_at,
            ],
        )?;
        for participant in &meeting.participants {
            tx.execute(
                "INSERT INTO meeting_participants (meeting_id, user_id, response, responded_at)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    meeting.id.to_string(),
                    participant.user_id.to_string(),
                    participant.response.as_str(),
                    participant.responded_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn update_meeting(&self, meeting: &Meeting) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE meetings
             SET
                title = ?2,
                agenda = ?3,
                location = ?4,
                starts_at = ?5,
                ends_at = ?6,
                status = ?7,
                updated_at = ?8
             WHERE id = ?1;",
            params![
                meeting.id.to_string(),
                meeting.title.as_str(),
                meeting.agenda.as_deref(),
                meeting.location.as_deref(),
                meeting.starts_at,
                meeting.ends_at,
                meeting.status.as_str(),
                meeting.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("meeting", meeting.id));
        }
        Ok(())
    }

    fn get_meeting(&self, id: MeetingId) -> RepoResult<Option<Meeting>> {
        let meeting = self
            .conn
            .query_row(
                &format!("{MEETING_SELECT_SQL} WHERE m.id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_meeting_row(row)),
            )
            .optional()?
            .transpose()?;

        match meeting {
            Some(mut meeting) => {
                meeting.participants = self.load_participants(meeting.id)?;
                Ok(Some(meeting))
            }
            None => Ok(None),
        }
    }

    fn list_for_user(&self, user_id: UserId, window: &MeetingWindow) -> RepoResult<Vec<Meeting>> {
        self.query_meetings(
            "(m.organizer_id = ?1 OR EXISTS (
                SELECT 1 FROM meeting_participants mp
                WHERE mp.meeting_id = m.id AND mp.user_id = ?1
            ))",
            user_id.to_string(),
            window,
        )
    }

    fn list_for_case(&self, case_id: CaseId, window: &MeetingWindow) -> RepoResult<Vec<Meeting>> {
        self.query_meetings("m.case_id = ?1", case_id.to_string(), window)
    }

    fn add_participant(&self, id: MeetingId, user_id: UserId) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO meeting_participants (meeting_id, user_id)
             VALUES (?1, ?2)
             ON CONFLICT(meeting_id, user_id) DO NOTHING;",
            params![id.to_string(), user_id.to_string()],
        )?;
        Ok(())
    }

    fn set_response(
        &self,
        id: MeetingId,
        user_id: UserId,
        response: ParticipantResponse,
        responded_at: i64,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE meeting_participants
             SET response = ?3, responded_at = ?4
             WHERE meeting_id = ?1 AND user_id = ?2;",
            params![
                id.to_string(),
                user_id.to_string(),
                response.as_str(),
                responded_at
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found(
                "meeting participant",
                format!("{id}/{user_id}"),
            ));
        }
        Ok(())
    }

    fn reset_responses(&self, id: MeetingId) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE meeting_participants
             SET response = 'pending', responded_at = NULL
             WHERE meeting_id = ?1;",
            [id.to_string()],
        )?;
        Ok(())
    }
}

fn parse_meeting_row(row: &Row<'_>) -> RepoResult<Meeting> {
    let id_text: String = row.get("id")?;
    let organizer_text: String = row.get("organizer_id")?;
    let status_text: String = row.get("status")?;
    Ok(Meeting {
        id: parse_uuid(&id_text, "meetings.id")?,
        case_id: parse_optional_uuid(row.get("case_id")?, "meetings.case_id")?,
        organizer_id: parse_uuid(&organizer_text, "meetings.organizer_id")?,
        title: row.get("title")?,
        agenda: row.get("agenda")?,
        location: row.get("location")?,
        starts_at: row.get("starts_at")?,
        ends_at: row.get("ends_at")?,
        status: parse_enum(&status_text, "meetings.status", MeetingStatus::parse)?,
        participants: Vec::new(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
