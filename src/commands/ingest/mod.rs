mod csv_results;
mod discovery;
mod run;
mod screenshots;
mod session;

pub use run::{FILE_TRACKER_FILE, FOLDER_TRACKER_FILE, latest_manifest, run};
