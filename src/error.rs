use thiserror::Error;

use crate::model::RosterKind;

/// Errors raised by the roster store and by parsing stored values back into the model.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Ô {slot} ({kind}) đã có người đăng ký")]
    SlotTaken { kind: RosterKind, slot: i32 },

    #[error("Ô {slot} không tồn tại trong đội hình {kind}")]
    SlotOutOfRange { kind: RosterKind, slot: i32 },

    #[error("Tên nhân vật không được để trống")]
    EmptyName,

    #[error("Không tìm thấy đăng ký #{0}")]
    NotFound(i32),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("unknown roster type: {0}")]
    UnknownKind(String),

    #[error("unknown character class: {0}")]
    UnknownClass(String),

    #[cfg(feature = "ssr")]
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}
