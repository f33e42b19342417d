pub mod app;
pub mod board;
pub mod error;
#[cfg(feature = "ssr")]
pub mod feed;
pub mod model;
#[cfg(feature = "ssr")]
pub mod schema;

#[cfg(feature = "ssr")]
use chrono::Utc;
#[cfg(feature = "ssr")]
use diesel::connection::SimpleConnection;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
#[cfg(feature = "ssr")]
use dotenvy::dotenv;
#[cfg(feature = "ssr")]
use std::env;
#[cfg(feature = "ssr")]
use tracing::info;
#[cfg(feature = "ssr")]
use uuid::Uuid;

#[cfg(feature = "ssr")]
use crate::error::RosterError;
#[cfg(feature = "ssr")]
use crate::model::{
    BoardSettings, DbBoardSettings, DbRegistration, NewAdminSession, NewDbRegistration,
    NewRegistration, Registration, SlotRef,
};
#[cfg(feature = "ssr")]
use crate::schema::{admin_sessions, board_settings, registrations};

#[cfg(feature = "hydrate")]
#[wasm_bindgen::prelude::wasm_bindgen]
pub fn hydrate() {
    use crate::app::*;
    console_error_panic_hook::set_once();
    leptos::mount::hydrate_body(App);
}

#[cfg(feature = "ssr")]
const SCHEMA_SQL: &str =
    include_str!("../migrations/2025-01-01-000000_create_registrations/up.sql");

/// Slot number a row is parked on while two rows trade places. Never a valid slot.
#[cfg(feature = "ssr")]
const PARKING_SLOT: i32 = 0;

#[cfg(feature = "ssr")]
pub fn establish_connection() -> SqliteConnection {
    dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set in .env");
    let mut conn = SqliteConnection::establish(&database_url)
        .unwrap_or_else(|_| panic!("Error connecting to {}", database_url));

    // Enable WAL mode to allow concurrent reads during writes, and a timeout to retry locked
    // operations.
    conn.batch_execute(
        "PRAGMA foreign_keys = ON; \
        PRAGMA journal_mode = WAL; \
        PRAGMA synchronous = NORMAL; \
        PRAGMA busy_timeout = 10000;",
    )
    .expect("Failed to set SQLite PRAGMAs");

    init_schema(&mut conn).expect("Failed to create the roster schema");

    conn
}

/// Creates the tables if they don't exist yet. Safe to run on every start.
#[cfg(feature = "ssr")]
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), RosterError> {
    conn.batch_execute(SCHEMA_SQL)?;
    Ok(())
}

/// Returns every registration, official board first, in slot order.
#[cfg(feature = "ssr")]
pub fn get_all_registrations(
    conn: &mut SqliteConnection,
) -> Result<Vec<Registration>, RosterError> {
    let rows: Vec<DbRegistration> = registrations::table
        .order((registrations::roster_type.asc(), registrations::team_slot.asc()))
        .select(DbRegistration::as_select())
        .load(conn)?;
    rows.into_iter().map(Registration::try_from).collect()
}

#[cfg(feature = "ssr")]
pub fn get_registration(
    conn: &mut SqliteConnection,
    registration_id: i32,
) -> Result<Registration, RosterError> {
    let row: Option<DbRegistration> = registrations::table
        .filter(registrations::id.eq(registration_id))
        .select(DbRegistration::as_select())
        .first(conn)
        .optional()?;
    row.ok_or(RosterError::NotFound(registration_id))?
        .try_into()
}

#[cfg(feature = "ssr")]
fn slot_is_taken(conn: &mut SqliteConnection, slot: SlotRef) -> Result<bool, RosterError> {
    let count: i64 = registrations::table
        .filter(
            registrations::roster_type
                .eq(slot.kind.label())
                .and(registrations::team_slot.eq(slot.team_slot)),
        )
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Signs a member up for a slot. Errors with `SlotTaken` if someone got there first, with
/// `SlotOutOfRange` for slot numbers the board doesn't have, and with `EmptyName` for a blank
/// name.
#[cfg(feature = "ssr")]
pub fn insert_registration(
    conn: &mut SqliteConnection,
    new_registration: &NewRegistration,
) -> Result<Registration, RosterError> {
    let char_name = new_registration.char_name.trim();
    if char_name.is_empty() {
        return Err(RosterError::EmptyName);
    }
    let slot = SlotRef::new(new_registration.slot.kind, new_registration.slot.team_slot)?;

    conn.transaction(|conn| {
        if slot_is_taken(conn, slot)? {
            return Err(RosterError::SlotTaken {
                kind: slot.kind,
                slot: slot.team_slot,
            });
        }

        let row = NewDbRegistration {
            char_name,
            class_name: new_registration.class_name.label(),
            roster_type: slot.kind.label(),
            team_slot: slot.team_slot,
            has_item: false,
            created_at: Utc::now().naive_utc(),
        };
        let inserted: DbRegistration = diesel::insert_into(registrations::table)
            .values(&row)
            .returning(DbRegistration::as_returning())
            .get_result(conn)?;

        info!(
            id = inserted.id,
            char_name = %inserted.char_name,
            slot = slot.team_slot,
            kind = %slot.kind,
            "registration added"
        );
        inserted.try_into()
    })
}

/// Deletes a registration. Returns the number of affected rows, so deleting a missing id is a
/// no-op.
#[cfg(feature = "ssr")]
pub fn delete_registration(
    conn: &mut SqliteConnection,
    registration_id: i32,
) -> Result<usize, RosterError> {
    let affected =
        diesel::delete(registrations::table.filter(registrations::id.eq(registration_id)))
            .execute(conn)?;
    Ok(affected)
}

#[cfg(feature = "ssr")]
fn set_slot(
    conn: &mut SqliteConnection,
    registration_id: i32,
    kind: &str,
    team_slot: i32,
) -> Result<(), RosterError> {
    diesel::update(registrations::table.filter(registrations::id.eq(registration_id)))
        .set((
            registrations::roster_type.eq(kind),
            registrations::team_slot.eq(team_slot),
        ))
        .execute(conn)?;
    Ok(())
}

/// Moves a registration into an empty slot.
#[cfg(feature = "ssr")]
pub fn move_registration(
    conn: &mut SqliteConnection,
    registration_id: i32,
    to: SlotRef,
) -> Result<Registration, RosterError> {
    let to = SlotRef::new(to.kind, to.team_slot)?;

    conn.transaction(|conn| {
        let current = get_registration(conn, registration_id)?;
        if current.slot() == to {
            return Ok(current);
        }
        if slot_is_taken(conn, to)? {
            return Err(RosterError::SlotTaken {
                kind: to.kind,
                slot: to.team_slot,
            });
        }

        set_slot(conn, registration_id, to.kind.label(), to.team_slot)?;
        info!(id = registration_id, slot = to.team_slot, kind = %to.kind, "registration moved");
        get_registration(conn, registration_id)
    })
}

/// Exchanges the slots of two registrations. Every other field stays with its row.
#[cfg(feature = "ssr")]
pub fn swap_registrations(
    conn: &mut SqliteConnection,
    first_id: i32,
    second_id: i32,
) -> Result<(Registration, Registration), RosterError> {
    conn.transaction(|conn| {
        let first = get_registration(conn, first_id)?;
        let second = get_registration(conn, second_id)?;
        if first.id == second.id {
            return Ok((first, second));
        }

        // Park the first row so the unique slot index holds after every statement.
        set_slot(conn, first.id, first.kind.label(), PARKING_SLOT)?;
        set_slot(conn, second.id, first.kind.label(), first.team_slot)?;
        set_slot(conn, first.id, second.kind.label(), second.team_slot)?;

        info!(first = first.id, second = second.id, "registrations swapped");
        Ok((
            get_registration(conn, first.id)?,
            get_registration(conn, second.id)?,
        ))
    })
}

/// Flips the "brought supplies" flag and returns the updated row.
#[cfg(feature = "ssr")]
pub fn toggle_has_item(
    conn: &mut SqliteConnection,
    registration_id: i32,
) -> Result<Registration, RosterError> {
    conn.transaction(|conn| {
        let current = get_registration(conn, registration_id)?;
        diesel::update(registrations::table.filter(registrations::id.eq(registration_id)))
            .set(registrations::has_item.eq(!current.has_item))
            .execute(conn)?;
        get_registration(conn, registration_id)
    })
}

/// Deletes every registration. Returns how many were removed.
#[cfg(feature = "ssr")]
pub fn reset_board(conn: &mut SqliteConnection) -> Result<usize, RosterError> {
    let affected = diesel::delete(registrations::table).execute(conn)?;
    info!(removed = affected, "board reset");
    Ok(affected)
}

/// Creates an admin session and returns the token.
#[cfg(feature = "ssr")]
pub fn create_admin_session(conn: &mut SqliteConnection) -> Result<String, RosterError> {
    let token_str = Uuid::new_v4().to_string();
    let new_session = NewAdminSession {
        token: token_str.clone(),
        created_at: Utc::now().naive_utc(),
    };
    diesel::insert_into(admin_sessions::table)
        .values(&new_session)
        .execute(conn)?;
    Ok(token_str)
}

/// Validates an admin token. Returns true if the provided token exists in the admin_sessions
/// table.
#[cfg(feature = "ssr")]
pub fn validate_admin_token(
    conn: &mut SqliteConnection,
    token: &str,
) -> Result<bool, RosterError> {
    if Uuid::parse_str(token).is_err() {
        return Ok(false);
    }
    let count: i64 = admin_sessions::table
        .filter(admin_sessions::token.eq(token))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

#[cfg(feature = "ssr")]
pub fn delete_admin_session(conn: &mut SqliteConnection, token: &str) -> Result<(), RosterError> {
    diesel::delete(admin_sessions::table.filter(admin_sessions::token.eq(token)))
        .execute(conn)?;
    Ok(())
}

#[cfg(feature = "ssr")]
pub fn get_board_settings(conn: &mut SqliteConnection) -> Result<BoardSettings, RosterError> {
    let settings: Option<DbBoardSettings> = board_settings::table
        .select(DbBoardSettings::as_select())
        .first(conn)
        .optional()?;
    Ok(settings
        .map(|s| BoardSettings {
            registration_limit: s.registration_limit,
        })
        .unwrap_or_default())
}

/// Turns the one-registration-per-device limit on or off.
#[cfg(feature = "ssr")]
pub fn set_registration_limit(
    conn: &mut SqliteConnection,
    enabled: bool,
) -> Result<BoardSettings, RosterError> {
    diesel::insert_into(board_settings::table)
        .values((
            board_settings::id.eq(1),
            board_settings::registration_limit.eq(enabled),
        ))
        .on_conflict(board_settings::id)
        .do_update()
        .set(board_settings::registration_limit.eq(enabled))
        .execute(conn)?;
    info!(enabled, "registration limit changed");
    get_board_settings(conn)
}

#[cfg(all(test, feature = "ssr"))]
mod tests {
    use super::*;
    use crate::model::{CharacterClass, RosterKind};

    // Helper to run a test against a fresh in-memory database with the schema applied.
    fn run_test_on_fresh_board<F>(test_fn: F)
    where
        F: FnOnce(&mut SqliteConnection) -> Result<(), RosterError>,
    {
        let mut conn =
            SqliteConnection::establish(":memory:").expect("Failed to open in-memory database");
        init_schema(&mut conn).expect("Failed to create schema");
        test_fn(&mut conn).expect("Test body returned an error");
    }

    fn signup(
        name: &str,
        class_name: CharacterClass,
        kind: RosterKind,
        slot: i32,
    ) -> NewRegistration {
        NewRegistration {
            char_name: name.to_string(),
            class_name,
            slot: SlotRef {
                kind,
                team_slot: slot,
            },
        }
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        run_test_on_fresh_board(|conn| {
            init_schema(conn)?;
            assert!(get_all_registrations(conn)?.is_empty());
            assert!(!get_board_settings(conn)?.registration_limit);
            Ok(())
        });
    }

    #[test]
    fn test_insert_registration() {
        run_test_on_fresh_board(|conn| {
            let row = insert_registration(
                conn,
                &signup("Khoa", CharacterClass::ToVan, RosterKind::Official, 5),
            )?;
            assert_eq!(row.char_name, "Khoa");
            assert_eq!(row.class_name, CharacterClass::ToVan);
            assert_eq!(row.kind, RosterKind::Official);
            assert_eq!(row.team_slot, 5);
            assert!(!row.has_item);
            assert!(row.created_at.and_utc().timestamp() > 0);

            let all = get_all_registrations(conn)?;
            assert_eq!(all, vec![row]);
            Ok(())
        });
    }

    #[test]
    fn test_insert_into_taken_slot_fails() {
        run_test_on_fresh_board(|conn| {
            insert_registration(
                conn,
                &signup("Khoa", CharacterClass::ToVan, RosterKind::Official, 5),
            )?;

            let err = insert_registration(
                conn,
                &signup("Lan", CharacterClass::ThietY, RosterKind::Official, 5),
            )
            .expect_err("Slot is already taken");
            assert!(matches!(
                err,
                RosterError::SlotTaken {
                    kind: RosterKind::Official,
                    slot: 5
                }
            ));

            // The same number on the trainee board is free.
            insert_registration(
                conn,
                &signup("Lan", CharacterClass::ThietY, RosterKind::Trainee, 5),
            )?;
            assert_eq!(get_all_registrations(conn)?.len(), 2);
            Ok(())
        });
    }

    #[test]
    fn test_insert_out_of_range_fails() {
        run_test_on_fresh_board(|conn| {
            let err = insert_registration(
                conn,
                &signup("Khoa", CharacterClass::ToVan, RosterKind::Trainee, 31),
            )
            .expect_err("Trainee board has 30 slots");
            assert!(matches!(err, RosterError::SlotOutOfRange { .. }));
            assert!(get_all_registrations(conn)?.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_insert_blank_name_fails() {
        run_test_on_fresh_board(|conn| {
            let err = insert_registration(
                conn,
                &signup("   ", CharacterClass::ToVan, RosterKind::Official, 7),
            )
            .expect_err("Blank names are rejected");
            assert!(matches!(err, RosterError::EmptyName));
            assert!(get_all_registrations(conn)?.is_empty());

            // Surrounding whitespace is trimmed, not rejected.
            let row = insert_registration(
                conn,
                &signup("  Khoa ", CharacterClass::ToVan, RosterKind::Official, 7),
            )?;
            assert_eq!(row.char_name, "Khoa");
            Ok(())
        });
    }

    #[test]
    fn test_delete_registration() {
        run_test_on_fresh_board(|conn| {
            let row = insert_registration(
                conn,
                &signup("Khoa", CharacterClass::ToVan, RosterKind::Official, 5),
            )?;
            assert_eq!(delete_registration(conn, row.id)?, 1);
            assert_eq!(delete_registration(conn, row.id)?, 0);
            assert!(matches!(
                get_registration(conn, row.id),
                Err(RosterError::NotFound(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn test_move_registration() {
        run_test_on_fresh_board(|conn| {
            let row = insert_registration(
                conn,
                &signup("Khoa", CharacterClass::ToVan, RosterKind::Official, 5),
            )?;
            let moved = move_registration(conn, row.id, SlotRef::trainee(12))?;
            assert_eq!(moved.id, row.id);
            assert_eq!(moved.kind, RosterKind::Trainee);
            assert_eq!(moved.team_slot, 12);
            assert_eq!(moved.char_name, row.char_name);

            let all = get_all_registrations(conn)?;
            assert_eq!(all.len(), 1);
            assert!(!all.iter().any(|r| r.slot() == row.slot()));
            Ok(())
        });
    }

    #[test]
    fn test_move_into_taken_slot_fails() {
        run_test_on_fresh_board(|conn| {
            let khoa = insert_registration(
                conn,
                &signup("Khoa", CharacterClass::ToVan, RosterKind::Official, 5),
            )?;
            let lan = insert_registration(
                conn,
                &signup("Lan", CharacterClass::CuuLinh, RosterKind::Official, 6),
            )?;
            let err = move_registration(conn, khoa.id, lan.slot()).expect_err("Slot is taken");
            assert!(matches!(err, RosterError::SlotTaken { .. }));
            assert_eq!(get_registration(conn, khoa.id)?.team_slot, 5);
            Ok(())
        });
    }

    #[test]
    fn test_swap_registrations() {
        run_test_on_fresh_board(|conn| {
            let khoa = insert_registration(
                conn,
                &signup("Khoa", CharacterClass::ToVan, RosterKind::Official, 5),
            )?;
            let khoa = toggle_has_item(conn, khoa.id)?;
            let lan = insert_registration(
                conn,
                &signup("Lan", CharacterClass::CuuLinh, RosterKind::Trainee, 1),
            )?;

            let (new_khoa, new_lan) = swap_registrations(conn, khoa.id, lan.id)?;
            assert_eq!(new_khoa.slot(), lan.slot());
            assert_eq!(new_lan.slot(), khoa.slot());

            // Everything but the slot travels with the row.
            assert_eq!(new_khoa.char_name, "Khoa");
            assert_eq!(new_khoa.class_name, CharacterClass::ToVan);
            assert!(new_khoa.has_item);
            assert_eq!(new_khoa.created_at, khoa.created_at);
            assert_eq!(new_lan.char_name, "Lan");
            assert!(!new_lan.has_item);
            assert_eq!(get_all_registrations(conn)?.len(), 2);
            Ok(())
        });
    }

    #[test]
    fn test_swap_missing_row_is_rolled_back() {
        run_test_on_fresh_board(|conn| {
            let khoa = insert_registration(
                conn,
                &signup("Khoa", CharacterClass::ToVan, RosterKind::Official, 5),
            )?;
            let err = swap_registrations(conn, khoa.id, 404).expect_err("No such row");
            assert!(matches!(err, RosterError::NotFound(404)));
            assert_eq!(get_registration(conn, khoa.id)?.team_slot, 5);
            Ok(())
        });
    }

    #[test]
    fn test_toggle_has_item_twice() {
        run_test_on_fresh_board(|conn| {
            let row = insert_registration(
                conn,
                &signup("Khoa", CharacterClass::ToVan, RosterKind::Official, 5),
            )?;
            assert!(toggle_has_item(conn, row.id)?.has_item);
            assert!(!toggle_has_item(conn, row.id)?.has_item);
            assert!(matches!(
                toggle_has_item(conn, 999),
                Err(RosterError::NotFound(999))
            ));
            Ok(())
        });
    }

    #[test]
    fn test_reset_board() {
        run_test_on_fresh_board(|conn| {
            for slot in 1..=3 {
                insert_registration(
                    conn,
                    &signup(
                        &format!("Member {}", slot),
                        CharacterClass::ThietY,
                        RosterKind::Official,
                        slot,
                    ),
                )?;
            }
            assert_eq!(reset_board(conn)?, 3);
            assert!(get_all_registrations(conn)?.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_admin_sessions() {
        run_test_on_fresh_board(|conn| {
            let token = create_admin_session(conn)?;
            assert!(validate_admin_token(conn, &token)?);
            assert!(!validate_admin_token(conn, "not-a-uuid")?);
            assert!(!validate_admin_token(conn, &Uuid::new_v4().to_string())?);

            delete_admin_session(conn, &token)?;
            assert!(!validate_admin_token(conn, &token)?);
            Ok(())
        });
    }

    #[test]
    fn test_registration_limit_setting() {
        run_test_on_fresh_board(|conn| {
            assert!(set_registration_limit(conn, true)?.registration_limit);
            assert!(get_board_settings(conn)?.registration_limit);
            assert!(!set_registration_limit(conn, false)?.registration_limit);
            Ok(())
        });
    }
}
