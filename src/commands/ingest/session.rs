use crate::cancel::CancelToken;
use crate::classify::{ImageClassifier, ImageInspector};
use crate::model::RunCounts;
use crate::settings::Settings;
use crate::store::Store;
use crate::tracker::ChangeTracker;

/// Whether a pipeline ran to the end or stopped on a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Finished,
    Cancelled,
}

/// Everything one ingest run needs, built once and passed by reference.
pub struct Session<I> {
    pub settings: Settings,
    pub store: Store,
    pub classifier: ImageClassifier<I>,
    pub folder_tracker: ChangeTracker,
    pub file_tracker: ChangeTracker,
    pub cancel: CancelToken,
    pub counts: RunCounts,
    pub warnings: Vec<String>,
}

impl<I: ImageInspector> Session<I> {
    pub fn new(
        settings: Settings,
        store: Store,
        inspector: I,
        folder_tracker: ChangeTracker,
        file_tracker: ChangeTracker,
        cancel: CancelToken,
    ) -> Self {
        let classifier = ImageClassifier::new(inspector, &settings);
        Self {
            settings,
            store,
            classifier,
            folder_tracker,
            file_tracker,
            cancel,
            counts: RunCounts::default(),
            warnings: Vec::new(),
        }
    }
}
