//! Capability polyfills installed into every rendered document.

/// Minimal `window.matchMedia`. Installed as an init script, so it is in
/// place before any of the document's own scripts run. Leaves a native
/// implementation untouched.
pub const MATCH_MEDIA: &str = r#"(() => {
  if (typeof window.matchMedia === "function") return;
  window.matchMedia = function (query) {
    return {
      matches: false,
      media: String(query),
      onchange: null,
      addListener: function () {},
      removeListener: function () {},
      addEventListener: function () {},
      removeEventListener: function () {},
      dispatchEvent: function () { return false; },
    };
  };
})();"#;

/// All polyfills, in installation order.
pub fn init_scripts() -> &'static [&'static str] {
    &[MATCH_MEDIA]
}
