pub mod setlist;
pub mod watch;
