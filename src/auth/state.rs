//! Authentication state traits and macro.

use crate::session::SessionKeys;

/// Trait for state types that can read and issue session cookies.
pub trait HasSessionState {
    fn session_keys(&self) -> &SessionKeys;
    fn secure_cookies(&self) -> bool;
}

/// Macro to implement `HasSessionState` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `keys: Arc<SessionKeys>`
/// - `secure_cookies: bool`
///
/// # Example
/// ```ignore
/// use crate::impl_has_session_state;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub keys: Arc<SessionKeys>,
///     pub secure_cookies: bool,
///     // ... other fields
/// }
///
/// impl_has_session_state!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_session_state {
    ($state_type:ty) => {
        impl $crate::auth::HasSessionState for $state_type {
            fn session_keys(&self) -> &$crate::session::SessionKeys {
                &self.keys
            }
            fn secure_cookies(&self) -> bool {
                self.secure_cookies
            }
        }
    };
}
