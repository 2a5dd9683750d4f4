use super::ContextProvider;
use core::fmt;
use std::cell::RefCell;

thread_local! {
    static LOCALE: RefCell<Option<Locale>> = const { RefCell::new(None) };
    static PRINCIPAL: RefCell<Option<Principal>> = const { RefCell::new(None) };
}

/// A language tag such as `en`, `de-AT`, or `pt-BR`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Locale(String);

impl Locale {
    /// The tag reported when a thread has no locale of its own.
    pub const DEFAULT_TAG: &'static str = "en";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TAG)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated caller and the roles granted to it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Principal {
    name: String,
    roles: Vec<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Keeps locale and principal in thread-local storage.
///
/// This is the conventional in-process store: whatever a thread sets is
/// visible to any code running on that thread until it is reset. It is also
/// exactly the kind of state that leaks between tasks on a reused worker,
/// which is why the pool brackets every task with install and clear.
///
/// # Example
/// ```
/// use scattergather::{ContextProvider, Locale, ThreadLocalContext};
///
/// let ctx = ThreadLocalContext;
/// ctx.set_locale(Locale::new("de-AT"));
/// assert_eq!(ctx.current_locale().as_str(), "de-AT");
/// ctx.reset_locale();
/// assert_eq!(ctx.current_locale(), Locale::default());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThreadLocalContext;

impl ContextProvider for ThreadLocalContext {
    type Locale = Locale;
    type Principal = Principal;

    fn current_locale(&self) -> Locale {
        LOCALE.with(|slot| slot.borrow().clone().unwrap_or_default())
    }

    fn set_locale(&self, locale: Locale) {
        LOCALE.with(|slot| *slot.borrow_mut() = Some(locale));
    }

    fn reset_locale(&self) {
        LOCALE.with(|slot| *slot.borrow_mut() = None);
    }

    fn current_principal(&self) -> Option<Principal> {
        PRINCIPAL.with(|slot| slot.borrow().clone())
    }

    fn set_principal(&self, principal: Principal) {
        PRINCIPAL.with(|slot| *slot.borrow_mut() = Some(principal));
    }

    fn clear_principal(&self) {
        PRINCIPAL.with(|slot| *slot.borrow_mut() = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_per_thread() {
        let ctx = ThreadLocalContext;
        ctx.set_locale(Locale::new("ja"));
        ctx.set_principal(Principal::new("root").with_role("admin"));

        std::thread::spawn(move || {
            assert_eq!(ctx.current_locale(), Locale::default());
            assert_eq!(ctx.current_principal(), None);
        })
        .join()
        .unwrap();

        assert_eq!(ctx.current_locale().as_str(), "ja");
        assert!(ctx.current_principal().unwrap().has_role("admin"));
    }

    #[test]
    fn clear_principal_forgets_it() {
        let ctx = ThreadLocalContext;
        ctx.set_principal(Principal::new("bob"));
        ctx.clear_principal();
        assert_eq!(ctx.current_principal(), None);
    }
}
