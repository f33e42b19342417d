#[cfg(feature = "ssr")]
use guild_roster::{establish_connection, reset_board};

#[cfg(feature = "ssr")]
fn main() {
    let mut conn = establish_connection();
    let removed = reset_board(&mut conn).expect("Failed to reset the board");
    println!("Board has been reset, {} registrations removed.", removed);
}

#[cfg(not(feature = "ssr"))]
fn main() {
    println!("This binary requires the 'ssr' feature to be enabled.");
}
