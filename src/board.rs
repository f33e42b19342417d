//! Client-side state of the sign-up board.
//!
//! Everything the page needs to decide whether an action is allowed lives in [`BoardState`]:
//! the last fetched snapshot, the pending slot choice, the row picked for a move, the admin
//! flag, and the name this device registered under. The methods here never talk to the store.
//! They validate against the snapshot and hand back what should be sent, so the page can show
//! an alert instead of issuing a call.

use thiserror::Error;

use crate::model::{
    BoardSettings, CharacterClass, NewRegistration, Registration, RosterChange, SlotRef,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("Vui lòng click chọn 1 ô trống bên dưới trước!")]
    NoSlotSelected,

    #[error("Vui lòng nhập tên nhân vật!")]
    EmptyName,

    #[error("Ô này đã có người đăng ký!")]
    SlotOccupied,

    #[error("Thiết bị này đã đăng ký cho {0}. Mỗi thiết bị chỉ được đăng ký 1 lần!")]
    AlreadyRegistered(String),

    #[error("Bạn chỉ có thể thao tác trên đăng ký của chính mình!")]
    NotPermitted,

    #[error("Chức năng này chỉ dành cho Admin!")]
    AdminOnly,

    #[error("Đăng ký này không còn tồn tại.")]
    UnknownRow,
}

/// Result of clicking a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotClick {
    /// The slot is now the pending choice for the registration form.
    Selected(SlotRef),
    /// The moving row should go to the empty slot `to`.
    Move { id: i32, to: SlotRef },
    /// The moving row and the occupant of the clicked slot should trade places.
    Swap { first: i32, second: i32 },
    /// The moving row was dropped back onto itself.
    Cancelled,
}

/// A delete the caller is allowed to make, pending confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub id: i32,
    pub char_name: String,
    /// True when the row is the one this device registered.
    pub own: bool,
    pub confirm_message: String,
}

#[derive(Debug, Clone, Default)]
pub struct BoardState {
    rows: Vec<Registration>,
    pub selected: Option<SlotRef>,
    pub moving: Option<i32>,
    pub is_admin: bool,
    pub my_name: Option<String>,
    pub settings: BoardSettings,
}

impl BoardState {
    pub fn rows(&self) -> &[Registration] {
        &self.rows
    }

    pub fn occupant(&self, slot: SlotRef) -> Option<&Registration> {
        self.rows.iter().find(|row| row.slot() == slot)
    }

    pub fn row(&self, id: i32) -> Option<&Registration> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn is_selected(&self, slot: SlotRef) -> bool {
        self.selected == Some(slot)
    }

    pub fn is_moving(&self, id: i32) -> bool {
        self.moving == Some(id)
    }

    pub fn is_own(&self, row: &Registration) -> bool {
        row.may_be_managed_by(self.my_name.as_deref(), false)
    }

    /// Whether the caller may delete the row or flip its supply flag.
    pub fn can_manage(&self, row: &Registration) -> bool {
        row.may_be_managed_by(self.my_name.as_deref(), self.is_admin)
    }

    pub fn count_for(&self, class: CharacterClass) -> usize {
        self.rows.iter().filter(|row| row.class_name == class).count()
    }

    pub fn total(&self) -> usize {
        self.rows.len()
    }

    /// Records `slot` as the pending choice. Does not touch the store.
    pub fn select_slot(&mut self, slot: SlotRef) {
        self.selected = Some(slot);
    }

    /// Handles a click on a grid cell. Outside of a move this only selects the slot; with a
    /// row picked for a move it resolves to a move, a swap, or a cancel, and the board returns
    /// to idle in every case.
    pub fn click_slot(&mut self, slot: SlotRef) -> Result<SlotClick, BoardError> {
        let Some(moving_id) = self.moving.take() else {
            self.select_slot(slot);
            return Ok(SlotClick::Selected(slot));
        };

        if !self.is_admin {
            return Err(BoardError::AdminOnly);
        }
        if self.row(moving_id).is_none() {
            return Err(BoardError::UnknownRow);
        }

        match self.occupant(slot) {
            None => Ok(SlotClick::Move {
                id: moving_id,
                to: slot,
            }),
            Some(occupant) if occupant.id == moving_id => Ok(SlotClick::Cancelled),
            Some(occupant) => Ok(SlotClick::Swap {
                first: moving_id,
                second: occupant.id,
            }),
        }
    }

    /// Validates the form against the snapshot and returns the row to insert.
    pub fn prepare_registration(
        &self,
        char_name: &str,
        class_name: CharacterClass,
    ) -> Result<NewRegistration, BoardError> {
        let slot = self.selected.ok_or(BoardError::NoSlotSelected)?;

        let char_name = char_name.trim();
        if char_name.is_empty() {
            return Err(BoardError::EmptyName);
        }

        if self.occupant(slot).is_some() {
            return Err(BoardError::SlotOccupied);
        }

        if self.settings.registration_limit && !self.is_admin {
            if let Some(mine) = self.my_name.as_deref() {
                if self.rows.iter().any(|row| row.char_name == mine) {
                    return Err(BoardError::AlreadyRegistered(mine.to_string()));
                }
            }
        }

        Ok(NewRegistration {
            char_name: char_name.to_string(),
            class_name,
            slot,
        })
    }

    /// Applies a successful insert: the row joins the snapshot, this device remembers the
    /// name, and the slot choice is cleared.
    pub fn complete_registration(&mut self, row: Registration) {
        self.my_name = Some(row.char_name.clone());
        self.selected = None;
        self.upsert(row);
    }

    pub fn request_delete(&self, id: i32) -> Result<DeleteRequest, BoardError> {
        let row = self.row(id).ok_or(BoardError::UnknownRow)?;
        let own = self.is_own(row);
        if !self.is_admin && !own {
            return Err(BoardError::NotPermitted);
        }

        let confirm_message = if self.is_admin {
            format!("Admin: Xóa {}?", row.char_name)
        } else {
            format!("Bạn muốn hủy đăng ký cho {}?", row.char_name)
        };

        Ok(DeleteRequest {
            id,
            char_name: row.char_name.clone(),
            own,
            confirm_message,
        })
    }

    pub fn complete_delete(&mut self, request: &DeleteRequest) {
        self.remove(request.id);
        if request.own {
            self.my_name = None;
        }
    }

    pub fn begin_move(&mut self, id: i32) -> Result<(), BoardError> {
        if !self.is_admin {
            return Err(BoardError::AdminOnly);
        }
        if self.row(id).is_none() {
            return Err(BoardError::UnknownRow);
        }
        self.moving = Some(id);
        self.selected = None;
        Ok(())
    }

    pub fn cancel_move(&mut self) {
        self.moving = None;
    }

    /// Returns the prompt to confirm before wiping the board.
    pub fn request_reset(&self) -> Result<&'static str, BoardError> {
        if !self.is_admin {
            return Err(BoardError::AdminOnly);
        }
        Ok("Admin: Xóa TOÀN BỘ danh sách đăng ký? Hành động này không thể hoàn tác!")
    }

    pub fn request_toggle_item(&self, id: i32) -> Result<i32, BoardError> {
        let row = self.row(id).ok_or(BoardError::UnknownRow)?;
        if !self.can_manage(row) {
            return Err(BoardError::NotPermitted);
        }
        Ok(id)
    }

    /// Returns the limit value to store.
    pub fn request_limit_toggle(&self) -> Result<bool, BoardError> {
        if !self.is_admin {
            return Err(BoardError::AdminOnly);
        }
        Ok(!self.settings.registration_limit)
    }

    /// Replaces the snapshot with a full fetch. A pending move whose row is gone is dropped.
    pub fn replace_snapshot(&mut self, rows: Vec<Registration>) {
        self.rows = rows;
        if let Some(id) = self.moving {
            if self.row(id).is_none() {
                self.moving = None;
            }
        }
    }

    /// Applies one change from the feed, keyed by row id.
    pub fn apply_change(&mut self, change: RosterChange) {
        match change {
            RosterChange::Upserted(row) => self.upsert(row),
            RosterChange::Removed { id } => self.remove(id),
            RosterChange::Cleared => {
                self.rows.clear();
                self.moving = None;
            }
            RosterChange::SettingsChanged(settings) => self.settings = settings,
            // The page answers a resync by refetching, which lands in `replace_snapshot`.
            RosterChange::Resync => {}
        }
    }

    fn upsert(&mut self, row: Registration) {
        match self.rows.iter_mut().find(|existing| existing.id == row.id) {
            Some(existing) => *existing = row,
            None => self.rows.push(row),
        }
    }

    fn remove(&mut self, id: i32) {
        self.rows.retain(|row| row.id != id);
        if self.moving == Some(id) {
            self.moving = None;
        }
    }
}
