use crate::dispatch::Dispatcher;
use storage::Storage;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) storage: Storage,
}
