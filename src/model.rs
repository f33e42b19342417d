use chrono::NaiveDateTime;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RosterError;

/// Number of teams on the official board, and the number of members per team.
pub const OFFICIAL_TEAMS: i32 = 10;
pub const TEAM_SIZE: i32 = 6;

/// Which of the two sub-boards a registration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RosterKind {
    #[serde(rename = "Chính thức")]
    Official,
    #[serde(rename = "Học việc")]
    Trainee,
}

impl RosterKind {
    pub const ALL: [RosterKind; 2] = [RosterKind::Official, RosterKind::Trainee];

    pub fn label(self) -> &'static str {
        match self {
            RosterKind::Official => "Chính thức",
            RosterKind::Trainee => "Học việc",
        }
    }

    /// Highest valid slot number on this board.
    pub fn capacity(self) -> i32 {
        match self {
            RosterKind::Official => OFFICIAL_TEAMS * TEAM_SIZE,
            RosterKind::Trainee => 30,
        }
    }
}

impl fmt::Display for RosterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RosterKind {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RosterKind::ALL
            .into_iter()
            .find(|kind| kind.label() == s)
            .ok_or_else(|| RosterError::UnknownKind(s.to_string()))
    }
}

/// Seats across both boards.
pub fn total_capacity() -> i32 {
    RosterKind::ALL.iter().map(|kind| kind.capacity()).sum()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    #[default]
    #[serde(rename = "Toái Mộng")]
    ToaiMong,
    #[serde(rename = "Thiết Y")]
    ThietY,
    #[serde(rename = "Huyết Hà")]
    HuyetHa,
    #[serde(rename = "Thần Tướng")]
    ThanTuong,
    #[serde(rename = "Tố Vấn")]
    ToVan,
    #[serde(rename = "Cửu Linh")]
    CuuLinh,
}

impl CharacterClass {
    pub const ALL: [CharacterClass; 6] = [
        CharacterClass::ToaiMong,
        CharacterClass::ThietY,
        CharacterClass::HuyetHa,
        CharacterClass::ThanTuong,
        CharacterClass::ToVan,
        CharacterClass::CuuLinh,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CharacterClass::ToaiMong => "Toái Mộng",
            CharacterClass::ThietY => "Thiết Y",
            CharacterClass::HuyetHa => "Huyết Hà",
            CharacterClass::ThanTuong => "Thần Tướng",
            CharacterClass::ToVan => "Tố Vấn",
            CharacterClass::CuuLinh => "Cửu Linh",
        }
    }

    /// Background color of an occupied slot.
    pub fn color(self) -> &'static str {
        match self {
            CharacterClass::ToaiMong => "#87CEEB",
            CharacterClass::ThietY => "#FFA500",
            CharacterClass::HuyetHa => "#8B0000",
            CharacterClass::ThanTuong => "#4169E1",
            CharacterClass::ToVan => "#FF69B4",
            CharacterClass::CuuLinh => "#800080",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            CharacterClass::ToaiMong => "🗡️",
            CharacterClass::ThietY => "🛡️",
            CharacterClass::HuyetHa => "🚩",
            CharacterClass::ThanTuong => "⚔️",
            CharacterClass::ToVan => "🌸",
            CharacterClass::CuuLinh => "🔮",
        }
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CharacterClass {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CharacterClass::ALL
            .into_iter()
            .find(|class| class.label() == s)
            .ok_or_else(|| RosterError::UnknownClass(s.to_string()))
    }
}

/// One addressable position in the roster grid. Slot numbers are reused across the two boards,
/// so a slot is only meaningful together with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub kind: RosterKind,
    pub team_slot: i32,
}

impl SlotRef {
    pub fn new(kind: RosterKind, team_slot: i32) -> Result<Self, RosterError> {
        if team_slot < 1 || team_slot > kind.capacity() {
            return Err(RosterError::SlotOutOfRange {
                kind,
                slot: team_slot,
            });
        }
        Ok(Self { kind, team_slot })
    }

    /// The slot in `team` (0-based) at `row` (0-based) of the official board.
    pub fn official(team: i32, row: i32) -> Self {
        Self {
            kind: RosterKind::Official,
            team_slot: team * TEAM_SIZE + row + 1,
        }
    }

    pub fn trainee(team_slot: i32) -> Self {
        Self {
            kind: RosterKind::Trainee,
            team_slot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: i32,
    pub char_name: String,
    pub class_name: CharacterClass,
    #[serde(rename = "type")]
    pub kind: RosterKind,
    pub team_slot: i32,
    pub has_item: bool,
    pub created_at: NaiveDateTime,
}

impl Registration {
    pub fn slot(&self) -> SlotRef {
        SlotRef {
            kind: self.kind,
            team_slot: self.team_slot,
        }
    }

    /// Admins manage every row. Anyone else only the row registered under the name they
    /// remember; an empty name owns nothing.
    pub fn may_be_managed_by(&self, requester_name: Option<&str>, is_admin: bool) -> bool {
        is_admin || requester_name.is_some_and(|name| !name.is_empty() && name == self.char_name)
    }
}

/// What the board submits when a member signs up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegistration {
    pub char_name: String,
    pub class_name: CharacterClass,
    pub slot: SlotRef,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSettings {
    pub registration_limit: bool,
}

/// A row-level change published to every connected board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RosterChange {
    Upserted(Registration),
    Removed { id: i32 },
    Cleared,
    SettingsChanged(BoardSettings),
    /// The subscriber missed changes and should fetch the whole roster again.
    Resync,
}

#[cfg(feature = "ssr")]
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::registrations)]
#[diesel(check_for_backend(Sqlite))]
pub struct DbRegistration {
    pub id: i32,
    pub char_name: String,
    pub class_name: String,
    pub roster_type: String,
    pub team_slot: i32,
    pub has_item: bool,
    pub created_at: NaiveDateTime,
}

#[cfg(feature = "ssr")]
impl TryFrom<DbRegistration> for Registration {
    type Error = RosterError;

    fn try_from(row: DbRegistration) -> Result<Self, Self::Error> {
        Ok(Registration {
            id: row.id,
            char_name: row.char_name,
            class_name: row.class_name.parse()?,
            kind: row.roster_type.parse()?,
            team_slot: row.team_slot,
            has_item: row.has_item,
            created_at: row.created_at,
        })
    }
}

#[cfg(feature = "ssr")]
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::registrations)]
pub struct NewDbRegistration<'a> {
    pub char_name: &'a str,
    pub class_name: &'a str,
    pub roster_type: &'a str,
    pub team_slot: i32,
    pub has_item: bool,
    pub created_at: NaiveDateTime,
}

#[cfg(feature = "ssr")]
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::admin_sessions)]
pub struct NewAdminSession {
    pub token: String,
    pub created_at: NaiveDateTime,
}

#[cfg(feature = "ssr")]
#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = crate::schema::board_settings)]
#[diesel(check_for_backend(Sqlite))]
pub struct DbBoardSettings {
    pub id: i32,
    pub registration_limit: bool,
}
