use leptos::ev::{MouseEvent, SubmitEvent};
use leptos::logging::log;
use leptos::prelude::*;
use leptos::server_fn::error::NoCustomError;
use leptos::task::spawn_local;
use leptos_meta::{provide_meta_context, MetaTags, Stylesheet, Title};
use leptos_router::{
    components::{Route, Router, Routes},
    path,
};
#[cfg(feature = "ssr")]
use std::env;

use crate::board::{BoardState, SlotClick};
use crate::model::{
    total_capacity, BoardSettings, CharacterClass, Registration, RosterChange, RosterKind,
    SlotRef, OFFICIAL_TEAMS, TEAM_SIZE,
};
#[cfg(feature = "ssr")]
use crate::{
    create_admin_session, delete_admin_session, delete_registration, error::RosterError,
    feed::RosterFeed, get_all_registrations, get_board_settings, get_registration,
    insert_registration, model::NewRegistration, move_registration, reset_board,
    set_registration_limit, swap_registrations, toggle_has_item, validate_admin_token,
};

#[cfg(feature = "ssr")]
use diesel::r2d2::{ConnectionManager, Pool};
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
#[cfg(feature = "ssr")]
pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[cfg(feature = "ssr")]
const ADMIN_COOKIE: &str = "roster_admin";

#[cfg(feature = "hydrate")]
const MY_NAME_KEY: &str = "guild_roster_my_name";

const EMPTY_SLOT_COLOR: &str = "#252525";

#[cfg(feature = "ssr")]
fn server_error(e: impl std::fmt::Display) -> ServerFnError<NoCustomError> {
    ServerFnError::ServerError(e.to_string())
}

// Runs a store operation on the blocking pool with a pooled connection.
#[cfg(feature = "ssr")]
async fn with_connection<T, F>(f: F) -> Result<T, ServerFnError<NoCustomError>>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, RosterError> + Send + 'static,
{
    let pool: DbPool = expect_context();
    tokio::task::spawn_blocking(move || -> Result<T, ServerFnError<NoCustomError>> {
        let mut conn = pool.get().map_err(server_error)?;
        f(&mut *conn).map_err(server_error)
    })
    .await
    .map_err(server_error)?
}

#[cfg(feature = "ssr")]
fn publish(change: RosterChange) {
    let feed: RosterFeed = expect_context();
    feed.publish(change);
}

#[cfg(feature = "ssr")]
async fn request_cookie(
    name: &'static str,
) -> Result<Option<String>, ServerFnError<NoCustomError>> {
    use axum::http::HeaderMap;
    use leptos_axum::extract;

    let headers: HeaderMap = extract().await.map_err(server_error)?;

    let value = headers
        .get(axum::http::header::COOKIE)
        .and_then(|header| header.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .find_map(|cookie| cookie.trim().strip_prefix(name)?.strip_prefix('='))
                .map(str::to_string)
        });
    Ok(value)
}

#[cfg(feature = "ssr")]
async fn admin_session_is_valid() -> Result<bool, ServerFnError<NoCustomError>> {
    match request_cookie(ADMIN_COOKIE).await? {
        Some(token) => with_connection(move |conn| validate_admin_token(conn, &token)).await,
        None => Ok(false),
    }
}

// Returns an empty result if the current request is from an admin, or an error otherwise.
#[cfg(feature = "ssr")]
async fn check_admin() -> Result<(), ServerFnError<NoCustomError>> {
    if admin_session_is_valid().await? {
        Ok(())
    } else {
        Err(server_error(RosterError::Unauthorized))
    }
}

// Admins may act on any row; everyone else only on the row registered under their remembered
// name.
#[cfg(feature = "ssr")]
async fn check_admin_or_owner(
    registration_id: i32,
    requester_name: String,
) -> Result<(), ServerFnError<NoCustomError>> {
    if admin_session_is_valid().await? {
        return Ok(());
    }
    let row = with_connection(move |conn| get_registration(conn, registration_id)).await?;
    if row.may_be_managed_by(Some(&requester_name), false) {
        Ok(())
    } else {
        Err(server_error(RosterError::Unauthorized))
    }
}

#[server(GetRegistrations)]
pub async fn get_registrations() -> Result<Vec<Registration>, ServerFnError<NoCustomError>> {
    with_connection(get_all_registrations).await
}

#[server(GetBoardSettings)]
pub async fn get_board_settings_handler(
) -> Result<BoardSettings, ServerFnError<NoCustomError>> {
    with_connection(get_board_settings).await
}

#[server(SubmitRegistration)]
pub async fn submit_registration(
    char_name: String,
    class_name: CharacterClass,
    kind: RosterKind,
    team_slot: i32,
) -> Result<Registration, ServerFnError<NoCustomError>> {
    let new_registration = NewRegistration {
        char_name,
        class_name,
        slot: SlotRef { kind, team_slot },
    };
    let row = with_connection(move |conn| insert_registration(conn, &new_registration)).await?;
    publish(RosterChange::Upserted(row.clone()));
    Ok(row)
}

#[server(DeleteRegistration)]
pub async fn delete_registration_handler(
    id: i32,
    requester_name: String,
) -> Result<(), ServerFnError<NoCustomError>> {
    check_admin_or_owner(id, requester_name).await?;

    let removed = with_connection(move |conn| delete_registration(conn, id)).await?;
    if removed > 0 {
        publish(RosterChange::Removed { id });
    }
    Ok(())
}

#[server(ToggleSupplyFlag)]
pub async fn toggle_supply_flag(
    id: i32,
    requester_name: String,
) -> Result<Registration, ServerFnError<NoCustomError>> {
    check_admin_or_owner(id, requester_name).await?;

    let row = with_connection(move |conn| toggle_has_item(conn, id)).await?;
    publish(RosterChange::Upserted(row.clone()));
    Ok(row)
}

#[server(MoveRegistration)]
pub async fn move_registration_handler(
    id: i32,
    kind: RosterKind,
    team_slot: i32,
) -> Result<Registration, ServerFnError<NoCustomError>> {
    check_admin().await?;

    let row =
        with_connection(move |conn| move_registration(conn, id, SlotRef { kind, team_slot }))
            .await?;
    publish(RosterChange::Upserted(row.clone()));
    Ok(row)
}

#[server(SwapRegistrations)]
pub async fn swap_registrations_handler(
    first_id: i32,
    second_id: i32,
) -> Result<(), ServerFnError<NoCustomError>> {
    check_admin().await?;

    let (first, second) =
        with_connection(move |conn| swap_registrations(conn, first_id, second_id)).await?;
    publish(RosterChange::Upserted(first));
    publish(RosterChange::Upserted(second));
    Ok(())
}

#[server(ResetBoard)]
pub async fn reset_board_handler() -> Result<usize, ServerFnError<NoCustomError>> {
    check_admin().await?;

    let removed = with_connection(reset_board).await?;
    publish(RosterChange::Cleared);
    Ok(removed)
}

#[server(SetRegistrationLimit)]
pub async fn set_registration_limit_handler(
    enabled: bool,
) -> Result<BoardSettings, ServerFnError<NoCustomError>> {
    check_admin().await?;

    let settings = with_connection(move |conn| set_registration_limit(conn, enabled)).await?;
    publish(RosterChange::SettingsChanged(settings));
    Ok(settings)
}

// Checks if the current request is from an admin. Returns true if it is, false otherwise.
#[server(IsAdmin)]
pub async fn is_admin() -> Result<bool, ServerFnError<NoCustomError>> {
    admin_session_is_valid().await
}

#[server(AdminLogin)]
pub async fn admin_login(password: String) -> Result<(), ServerFnError<NoCustomError>> {
    let admin_password = env::var("ADMIN_PASSWORD")
        .map_err(|_| server_error("Admin password not set"))?;

    if password != admin_password {
        tracing::warn!("rejected admin login attempt");
        return Err(server_error("Invalid password"));
    }

    let token = with_connection(create_admin_session).await?;

    use leptos_axum::ResponseOptions;
    let resp: ResponseOptions = expect_context();
    let cookie = format!(
        "{}={}; Max-Age=86400; Path=/; HttpOnly; SameSite=Strict",
        ADMIN_COOKIE, token
    );
    resp.insert_header(
        axum::http::header::SET_COOKIE,
        axum::http::HeaderValue::from_str(&cookie).map_err(server_error)?,
    );

    tracing::info!("admin logged in");
    Ok(())
}

#[server(AdminLogout)]
pub async fn admin_logout() -> Result<(), ServerFnError<NoCustomError>> {
    if let Some(token) = request_cookie(ADMIN_COOKIE).await? {
        with_connection(move |conn| delete_admin_session(conn, &token)).await?;
    }

    use leptos_axum::ResponseOptions;
    let resp: ResponseOptions = expect_context();
    let cookie = format!("{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Strict", ADMIN_COOKIE);
    resp.insert_header(
        axum::http::header::SET_COOKIE,
        axum::http::HeaderValue::from_str(&cookie).map_err(server_error)?,
    );
    Ok(())
}

fn alert(message: &str) {
    leptos::leptos_dom::helpers::window()
        .alert_with_message(message)
        .unwrap_or_default();
}

fn confirm(message: &str) -> bool {
    leptos::leptos_dom::helpers::window()
        .confirm_with_message(message)
        .unwrap_or(false)
}

fn prompt(message: &str) -> Option<String> {
    leptos::leptos_dom::helpers::window()
        .prompt_with_message(message)
        .ok()
        .flatten()
}

// Shows a failed store call to the user. The board keeps its last good snapshot.
fn report(e: ServerFnError<NoCustomError>) {
    let message = match e {
        ServerFnError::ServerError(message) => message,
        other => other.to_string(),
    };
    log!("Store error: {}", message);
    alert(&format!("Lỗi: {}", message));
}

#[cfg(feature = "hydrate")]
fn local_storage() -> Option<web_sys::Storage> {
    web_sys::window()?.local_storage().ok().flatten()
}

/// The name this device last registered under.
#[cfg(feature = "hydrate")]
fn load_my_name() -> Option<String> {
    local_storage()?
        .get_item(MY_NAME_KEY)
        .ok()
        .flatten()
        .filter(|name| !name.is_empty())
}

#[cfg(not(feature = "hydrate"))]
fn load_my_name() -> Option<String> {
    None
}

#[cfg(feature = "hydrate")]
fn remember_my_name(name: Option<&str>) {
    let Some(storage) = local_storage() else {
        return;
    };
    let result = match name {
        Some(name) => storage.set_item(MY_NAME_KEY, name),
        None => storage.remove_item(MY_NAME_KEY),
    };
    if let Err(e) = result {
        log!("Failed to update local storage: {:?}", e);
    }
}

#[cfg(not(feature = "hydrate"))]
fn remember_my_name(_name: Option<&str>) {}

#[cfg(feature = "hydrate")]
type RosterResource = Resource<Result<Vec<Registration>, ServerFnError<NoCustomError>>>;

#[cfg(feature = "hydrate")]
const RECONNECT_DELAY_MS: i32 = 3000;

/// Websocket address of the change feed for a page served from `host` over `protocol`.
#[cfg(any(feature = "hydrate", test))]
fn roster_feed_url(protocol: &str, host: &str) -> String {
    let scheme = if protocol == "https:" { "wss" } else { "ws" };
    format!("{}://{}/ws/roster", scheme, host)
}

/// Opens the roster websocket and applies every change to the board as it arrives. When the
/// socket closes the page refetches and opens a new one after a short delay.
#[cfg(feature = "hydrate")]
fn subscribe_to_roster(board: RwSignal<BoardState>, roster: RosterResource) {
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;

    let Some(window) = web_sys::window() else {
        return;
    };
    let location = window.location();
    let protocol = location.protocol().unwrap_or_default();
    let Ok(host) = location.host() else {
        return;
    };

    let socket = match web_sys::WebSocket::new(&roster_feed_url(&protocol, &host)) {
        Ok(socket) => socket,
        Err(e) => {
            log!("Failed to open the roster feed: {:?}", e);
            return;
        }
    };

    let on_message =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |ev: web_sys::MessageEvent| {
            let Some(text) = ev.data().as_string() else {
                return;
            };
            match serde_json::from_str::<RosterChange>(&text) {
                Ok(RosterChange::Resync) => roster.refetch(),
                Ok(change) => board.update(|b| b.apply_change(change)),
                Err(e) => log!("Ignoring malformed roster change: {}", e),
            }
        });
    socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    on_message.forget();

    // Changes published while the socket was down are lost, so refetch once reconnected.
    let on_close = Closure::<dyn FnMut()>::new(move || {
        log!("Roster feed closed, reconnecting in {} ms", RECONNECT_DELAY_MS);
        roster.refetch();
        let reconnect = Closure::once_into_js(move || {
            subscribe_to_roster(board, roster);
            roster.refetch();
        });
        let scheduled = web_sys::window().map(|window| {
            window.set_timeout_with_callback_and_timeout_and_arguments_0(
                reconnect.unchecked_ref(),
                RECONNECT_DELAY_MS,
            )
        });
        if let Some(Err(e)) = scheduled {
            log!("Failed to schedule a roster feed reconnect: {:?}", e);
        }
    });
    socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));
    on_close.forget();
}

pub fn shell(options: LeptosOptions) -> impl IntoView {
    view! {
        <!DOCTYPE html>
        <html lang="vi">
            <head>
                <meta charset="utf-8" />
                <meta name="viewport" content="width=device-width, initial-scale=1" />
                <AutoReload options=options.clone() />
                <HydrationScripts options />
                <MetaTags />
            </head>
            <body>
                <App />
            </body>
        </html>
    }
}

#[component]
pub fn App() -> impl IntoView {
    // Provides context that manages stylesheets, titles, meta tags, etc.
    provide_meta_context();

    view! {
        // id=leptos means cargo-leptos will hot-reload this stylesheet
        <Stylesheet id="leptos" href="/pkg/guild-roster.css" />

        <Title text="Đăng ký Bang Chiến" />

        <Router>
            <main>
                <Routes fallback=|| "Page not found.".into_view()>
                    <Route path=path!("/") view=RosterBoard />
                </Routes>
            </main>
        </Router>
    }
}

/// What a click inside a grid cell asks the board to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotAction {
    Click(SlotRef),
    Delete(i32),
    BeginMove(i32),
    ToggleItem(i32),
}

#[component]
fn RosterBoard() -> impl IntoView {
    let roster = Resource::new(|| (), |_| get_registrations());
    let settings = Resource::new(|| (), |_| get_board_settings_handler());
    let admin = Resource::new(|| (), |_| is_admin());

    let board = RwSignal::new(BoardState::default());
    let char_name = RwSignal::new(String::new());
    let class_name = RwSignal::new(CharacterClass::default());

    // Keep the view-model in step with the latest fetches.
    Effect::new(move || {
        if let Some(Ok(rows)) = roster.get() {
            board.update(|b| b.replace_snapshot(rows));
        }
    });
    Effect::new(move || {
        if let Some(Ok(current)) = settings.get() {
            board.update(|b| b.settings = current);
        }
    });
    Effect::new(move || {
        if let Some(Ok(flag)) = admin.get() {
            board.update(|b| {
                b.is_admin = flag;
                if !flag {
                    b.cancel_move();
                }
            });
        }
    });

    // Runs once in the browser: restore this device's name and start listening for changes.
    Effect::new(move || {
        board.update(|b| b.my_name = load_my_name());
        #[cfg(feature = "hydrate")]
        {
            subscribe_to_roster(board, roster);
        }
    });

    let requester_name = move || {
        board
            .with_untracked(|b| b.my_name.clone())
            .unwrap_or_default()
    };

    let submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        let request = board.with_untracked(|b| {
            b.prepare_registration(&char_name.get_untracked(), class_name.get_untracked())
        });
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                alert(&e.to_string());
                return;
            }
        };
        spawn_local(async move {
            match submit_registration(
                request.char_name,
                request.class_name,
                request.slot.kind,
                request.slot.team_slot,
            )
            .await
            {
                Ok(row) => {
                    remember_my_name(Some(&row.char_name));
                    board.update(|b| b.complete_registration(row));
                    char_name.set(String::new());
                    roster.refetch();
                }
                Err(e) => report(e),
            }
        });
    };

    let click_slot = move |slot: SlotRef| match board.try_update(|b| b.click_slot(slot)) {
        Some(Ok(SlotClick::Move { id, to })) => spawn_local(async move {
            match move_registration_handler(id, to.kind, to.team_slot).await {
                Ok(_) => roster.refetch(),
                Err(e) => report(e),
            }
        }),
        Some(Ok(SlotClick::Swap { first, second })) => spawn_local(async move {
            match swap_registrations_handler(first, second).await {
                Ok(()) => roster.refetch(),
                Err(e) => report(e),
            }
        }),
        Some(Ok(SlotClick::Selected(_) | SlotClick::Cancelled)) | None => {}
        Some(Err(e)) => alert(&e.to_string()),
    };

    let delete = move |id: i32| {
        let request = match board.with_untracked(|b| b.request_delete(id)) {
            Ok(request) => request,
            Err(e) => {
                alert(&e.to_string());
                return;
            }
        };
        if !confirm(&request.confirm_message) {
            return;
        }
        let requester = requester_name();
        spawn_local(async move {
            match delete_registration_handler(request.id, requester).await {
                Ok(()) => {
                    if request.own {
                        remember_my_name(None);
                    }
                    board.update(|b| b.complete_delete(&request));
                    roster.refetch();
                }
                Err(e) => report(e),
            }
        });
    };

    let toggle_item = move |id: i32| {
        if let Err(e) = board.with_untracked(|b| b.request_toggle_item(id)) {
            alert(&e.to_string());
            return;
        }
        let requester = requester_name();
        spawn_local(async move {
            match toggle_supply_flag(id, requester).await {
                Ok(row) => board.update(|b| b.apply_change(RosterChange::Upserted(row))),
                Err(e) => report(e),
            }
        });
    };

    let begin_move = move |id: i32| {
        if let Some(Err(e)) = board.try_update(|b| b.begin_move(id)) {
            alert(&e.to_string());
        }
    };

    let on_action = Callback::new(move |action: SlotAction| match action {
        SlotAction::Click(slot) => click_slot(slot),
        SlotAction::Delete(id) => delete(id),
        SlotAction::BeginMove(id) => begin_move(id),
        SlotAction::ToggleItem(id) => toggle_item(id),
    });

    let login = move |_: MouseEvent| {
        let Some(password) = prompt("Nhập mật mã Admin để điều chỉnh:") else {
            return;
        };
        spawn_local(async move {
            match admin_login(password).await {
                Ok(()) => {
                    admin.refetch();
                    alert("Đã đăng nhập quyền Admin! Bạn có thể xóa bất kỳ ai.");
                }
                Err(e) => {
                    log!("Admin login failed: {}", e);
                    alert("Sai mật mã!");
                }
            }
        });
    };

    let logout = move |_: MouseEvent| {
        spawn_local(async move {
            if let Err(e) = admin_logout().await {
                report(e);
            }
            admin.refetch();
        });
    };

    let reset = move |_: MouseEvent| {
        let message = match board.with_untracked(|b| b.request_reset()) {
            Ok(message) => message,
            Err(e) => {
                alert(&e.to_string());
                return;
            }
        };
        if !confirm(message) {
            return;
        }
        spawn_local(async move {
            match reset_board_handler().await {
                Ok(_) => {
                    board.update(|b| b.apply_change(RosterChange::Cleared));
                    roster.refetch();
                }
                Err(e) => report(e),
            }
        });
    };

    let toggle_limit = move |_: MouseEvent| {
        let enabled = match board.with_untracked(|b| b.request_limit_toggle()) {
            Ok(enabled) => enabled,
            Err(e) => {
                alert(&e.to_string());
                return;
            }
        };
        spawn_local(async move {
            match set_registration_limit_handler(enabled).await {
                Ok(current) => board.update(|b| b.settings = current),
                Err(e) => report(e),
            }
        });
    };

    let cancel_move = move |_: MouseEvent| board.update(|b| b.cancel_move());

    view! {
        <div class="roster-page">
            <div class="admin-toggle">
                {move || {
                    if board.with(|b| b.is_admin) {
                        view! {
                            <button class="btn-admin on" on:click=logout>
                                "QUYỀN ADMIN: ON"
                            </button>
                        }
                            .into_any()
                    } else {
                        view! {
                            <button class="btn-admin" on:click=login>
                                "ADMIN LOGIN"
                            </button>
                        }
                            .into_any()
                    }
                }}
            </div>

            <h1 class="roster-title">"ĐĂNG KÝ BANG CHIẾN"</h1>

            <Transition fallback=|| {
                view! { <p class="loading">"Đang tải danh sách..."</p> }
            }>
                {move || {
                    roster
                        .get()
                        .and_then(|result| match result {
                            Ok(rows) => {
                                // Seeded during render so the first server paint shows the roster.
                                board.update_untracked(|b| b.replace_snapshot(rows));
                                None
                            }
                            Err(e) => {
                                Some(
                                    view! {
                                        <p class="load-error">
                                            "Lỗi tải danh sách: " {e.to_string()}
                                        </p>
                                    },
                                )
                            }
                        })
                }}

                <Tally board=board />

                <form class="roster-form" on:submit=submit>
                    <input
                        class="form-input"
                        type="text"
                        placeholder="Tên nhân vật..."
                        required=true
                        prop:value=move || char_name.get()
                        on:input=move |ev| char_name.set(event_target_value(&ev))
                    />
                    <select
                        class="form-select"
                        prop:value=move || class_name.get().label()
                        on:change=move |ev| {
                            if let Ok(class) = event_target_value(&ev).parse::<CharacterClass>() {
                                class_name.set(class);
                            }
                        }
                    >
                        {CharacterClass::ALL
                            .into_iter()
                            .map(|class| {
                                view! {
                                    <option value=class.label()>
                                        {class.emoji()} " " {class.label()}
                                    </option>
                                }
                            })
                            .collect_view()}
                    </select>
                    <button type="submit" class="btn-primary">
                        "XÁC NHẬN Ô "
                        {move || {
                            board
                                .with(|b| b.selected.map(|slot| slot.team_slot.to_string()))
                                .unwrap_or_else(|| "...".to_string())
                        }}
                    </button>
                </form>

                {move || {
                    board
                        .with(|b| b.is_admin)
                        .then(|| {
                            view! {
                                <div class="admin-bar">
                                    <button class="btn-admin-action" on:click=toggle_limit>
                                        {move || {
                                            if board.with(|b| b.settings.registration_limit) {
                                                "GIỚI HẠN 1 ĐĂNG KÝ / THIẾT BỊ: BẬT"
                                            } else {
                                                "GIỚI HẠN 1 ĐĂNG KÝ / THIẾT BỊ: TẮT"
                                            }
                                        }}
                                    </button>
                                    <button class="btn-danger" on:click=reset>
                                        "RESET BẢNG"
                                    </button>
                                    {move || {
                                        board
                                            .with(|b| {
                                                b.moving
                                                    .and_then(|id| b.row(id))
                                                    .map(|row| row.char_name.clone())
                                            })
                                            .map(|name| {
                                                view! {
                                                    <span class="moving-hint">
                                                        "Đang di chuyển " {name} ": chọn ô đích"
                                                    </span>
                                                    <button
                                                        class="btn-cancel"
                                                        on:click=cancel_move
                                                    >
                                                        "HỦY"
                                                    </button>
                                                }
                                            })
                                    }}
                                </div>
                            }
                        })
                }}

                <RosterGrids board=board on_action=on_action />
            </Transition>
        </div>
    }
}

/// The official board, team by team, followed by the trainee board.
#[component]
fn RosterGrids(board: RwSignal<BoardState>, on_action: Callback<SlotAction>) -> impl IntoView {
    view! {
        <h2 class="board-title official">
            "ĐỘI HÌNH CHÍNH THỨC (" {RosterKind::Official.capacity()} ")"
        </h2>
        <div class="official-grid">
            {(0..OFFICIAL_TEAMS)
                .map(move |team| {
                    view! {
                        <div class="team">
                            <div class="team-title">"ĐỘI " {team + 1}</div>
                            {(0..TEAM_SIZE)
                                .map(move |row| {
                                    view! {
                                        <SlotCell
                                            at=SlotRef::official(team, row)
                                            board=board
                                            on_action=on_action
                                        />
                                    }
                                })
                                .collect_view()}
                        </div>
                    }
                })
                .collect_view()}
        </div>

        <h2 class="board-title trainee">
            "DỰ BỊ / HỌC VIỆC (" {RosterKind::Trainee.capacity()} ")"
        </h2>
        <div class="trainee-grid">
            {(1..=RosterKind::Trainee.capacity())
                .map(move |team_slot| {
                    view! {
                        <div class="trainee-cell">
                            <SlotCell
                                at=SlotRef::trainee(team_slot)
                                board=board
                                on_action=on_action
                            />
                        </div>
                    }
                })
                .collect_view()}
        </div>
    }
}

/// Member counts per class and the overall fill of the board.
#[component]
fn Tally(board: RwSignal<BoardState>) -> impl IntoView {
    view! {
        <div class="tally">
            {CharacterClass::ALL
                .into_iter()
                .map(move |class| {
                    view! {
                        <div class="tally-item">
                            <div class="tally-label" style:color=class.color()>
                                {class.emoji()} " " {class.label()}
                            </div>
                            <div class="tally-count">
                                {move || board.with(|b| b.count_for(class))}
                            </div>
                        </div>
                    }
                })
                .collect_view()}
            <div class="tally-item tally-total">
                <div class="tally-label">"TỔNG CỘNG"</div>
                <div class="tally-count">
                    {move || board.with(|b| b.total())} " / " {total_capacity()}
                </div>
            </div>
        </div>
    }
}

#[component]
fn SlotCell(
    at: SlotRef,
    board: RwSignal<BoardState>,
    on_action: Callback<SlotAction>,
) -> impl IntoView {
    let occupant = move || board.with(|b| b.occupant(at).cloned());
    let background = move || {
        board.with(|b| {
            b.occupant(at)
                .map(|row| row.class_name.color())
                .unwrap_or(EMPTY_SLOT_COLOR)
        })
    };

    view! {
        <div
            class="slot"
            class:occupied=move || board.with(|b| b.occupant(at).is_some())
            class:selected=move || board.with(|b| b.is_selected(at))
            class:moving=move || {
                board.with(|b| b.occupant(at).is_some_and(|row| b.is_moving(row.id)))
            }
            style:background-color=background
            on:click=move |_| on_action.run(SlotAction::Click(at))
        >
            {move || match occupant() {
                Some(row) => {
                    let id = row.id;
                    let can_manage = board.with(|b| b.can_manage(&row));
                    let is_admin = board.with(|b| b.is_admin);
                    view! {
                        <span class="slot-name">{row.char_name.clone()}</span>
                        {row
                            .has_item
                            .then(|| {
                                view! {
                                    <span class="slot-item" title="Đã mang vật phẩm">
                                        "🎒"
                                    </span>
                                }
                            })}
                        {can_manage
                            .then(|| {
                                view! {
                                    <button
                                        class="slot-btn slot-delete"
                                        title="Xóa"
                                        on:click=move |ev: MouseEvent| {
                                            ev.stop_propagation();
                                            on_action.run(SlotAction::Delete(id));
                                        }
                                    >
                                        "×"
                                    </button>
                                    <button
                                        class="slot-btn slot-item-toggle"
                                        title="Đánh dấu đã mang vật phẩm"
                                        on:click=move |ev: MouseEvent| {
                                            ev.stop_propagation();
                                            on_action.run(SlotAction::ToggleItem(id));
                                        }
                                    >
                                        "✓"
                                    </button>
                                }
                            })}
                        {is_admin
                            .then(|| {
                                view! {
                                    <button
                                        class="slot-btn slot-move"
                                        title="Di chuyển / đổi chỗ"
                                        on:click=move |ev: MouseEvent| {
                                            ev.stop_propagation();
                                            on_action.run(SlotAction::BeginMove(id));
                                        }
                                    >
                                        "⇄"
                                    </button>
                                }
                            })}
                    }
                        .into_any()
                }
                None => view! { <span class="slot-number">{at.team_slot}</span> }.into_any(),
            }}
        </div>
    }
}

#[cfg(all(test, feature = "ssr"))]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use leptos::reactive::owner::Owner;
    use leptos::tachys::view::RenderHtml;

    fn registration(id: i32, name: &str, slot: SlotRef) -> Registration {
        Registration {
            id,
            char_name: name.to_string(),
            class_name: CharacterClass::ToVan,
            kind: slot.kind,
            team_slot: slot.team_slot,
            has_item: false,
            created_at: NaiveDateTime::default(),
        }
    }

    // Renders a board seeded with `rows` the way the server's first paint does.
    fn render_grids(rows: Vec<Registration>) -> String {
        let owner = Owner::new();
        owner.with(|| {
            let mut state = BoardState::default();
            state.replace_snapshot(rows);
            let board = RwSignal::new(state);
            let on_action = Callback::new(|_: SlotAction| {});
            view! { <RosterGrids board=board on_action=on_action /> }.to_html()
        })
    }

    #[test]
    fn test_grids_render_every_slot() {
        let html = render_grids(Vec::new());
        assert_eq!(html.matches("slot-number").count(), 90);
        assert_eq!(html.matches("class=\"team\"").count(), 10);
    }

    #[test]
    fn test_grids_render_seeded_roster() {
        let html = render_grids(vec![
            registration(1, "Khoa", SlotRef::official(0, 4)),
            registration(2, "Lan", SlotRef::trainee(30)),
        ]);
        assert!(html.contains("Khoa"));
        assert!(html.contains("Lan"));
        assert!(html.contains("#FF69B4"));
        assert_eq!(html.matches("slot-number").count(), 88);
        // A visitor with no remembered name gets no row controls.
        assert!(!html.contains("slot-delete"));
    }

    #[test]
    fn test_roster_feed_url() {
        assert_eq!(
            roster_feed_url("https:", "guild.example:8443"),
            "wss://guild.example:8443/ws/roster"
        );
        assert_eq!(
            roster_feed_url("http:", "127.0.0.1:3000"),
            "ws://127.0.0.1:3000/ws/roster"
        );
        assert_eq!(roster_feed_url("", "localhost"), "ws://localhost/ws/roster");
    }
}
