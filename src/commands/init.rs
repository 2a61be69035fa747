use anyhow::Result;
use tracing::{info, warn};

use crate::cli::InitArgs;
use crate::settings::Settings;
use crate::util::ensure_directory;

pub fn run(args: InitArgs) -> Result<()> {
    let data_root = args.data_root;
    ensure_directory(&data_root)?;

    let settings_path = args
        .settings_path
        .unwrap_or_else(|| data_root.join("settings.json"));

    let settings = match Settings::load(&settings_path)? {
        Some(existing) if !args.force => {
            info!(path = %settings_path.display(), "settings already present, leaving them as is");
            existing
        }
        _ => {
            let defaults = Settings::default();
            defaults.save(&settings_path)?;
            info!(path = %settings_path.display(), "wrote default settings");
            defaults
        }
    };

    let tessdata_dir = settings.resolved_tessdata_dir(&data_root);
    ensure_directory(&tessdata_dir)?;
    let lang_file = tessdata_dir.join(format!("{}.traineddata", settings.ocr_lang));
    if !lang_file.is_file() {
        warn!(
            path = %lang_file.display(),
            "OCR language data missing; copy it there before ingesting screenshots"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_keeps_existing_settings_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let data_root = dir.path().join("data");
        let settings_path = data_root.join("settings.json");

        let args = |force| InitArgs {
            data_root: data_root.clone(),
            settings_path: None,
            force,
        };

        run(args(false)).unwrap();
        assert!(data_root.join("tessdata").is_dir());

        let custom = Settings {
            ocr_marker: "REJECT".to_string(),
            ..Settings::default()
        };
        custom.save(&settings_path).unwrap();

        run(args(false)).unwrap();
        assert_eq!(Settings::load(&settings_path).unwrap().unwrap().ocr_marker, "REJECT");

        run(args(true)).unwrap();
        assert_eq!(Settings::load(&settings_path).unwrap().unwrap().ocr_marker, "NG");
    }
}
