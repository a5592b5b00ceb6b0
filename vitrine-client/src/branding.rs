//! Turns the public settings into the branding of a page
//!
//! [`apply_branding`] compares a settings snapshot with the branding applied last
//! and describes what has to change on the page ([`BrandingEffects`]).
//! It never touches a page itself, so every view can apply the effects its own way.
//!
//! [`BrandingPropagator`] connects it to a [`ResourceCache`] subscription
//! and broadcasts the effects to every open view.

use std::borrow::Cow;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;
use vitrine_core::re_exports::time::OffsetDateTime;
use vitrine_core::schema::SettingsMap;
use vitrine_core::schema::setting_keys;

use crate::api::VitrineApi;
use crate::cache::ResourceCache;
use crate::cache::ResourceKey;
use crate::cache::ResourceState;
use crate::error::ClientError;

/// Used when no primary color is set or it is not a valid hex color
pub const DEFAULT_PRIMARY_COLOR: &str = "#2563eb";

/// Used when no theme is set
pub const DEFAULT_THEME: &str = "light";

/// Used when no company name is set
pub const DEFAULT_COMPANY_NAME: &str = "Vitrine";

/// Foreground is dark on colors lighter than this
pub const DARK_FOREGROUND_THRESHOLD: f64 = 0.6;

/// Query parameter carrying the cache-busting token
const FRESHNESS_PARAMETER: &str = "v";

/// A color in the HSL color space
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Hsl {
    /// In degrees, `0.0..360.0`
    pub hue: f64,
    /// `0.0..=1.0`
    pub saturation: f64,
    /// `0.0..=1.0`
    pub lightness: f64,
}

impl Hsl {
    /// Parses `#rrggbb` or `#rgb` (the `#` is optional)
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(digits.get(range)?, 16).ok()
        };
        let (red, green, blue) = match digits.len() {
            6 => (channel(0..2)?, channel(2..4)?, channel(4..6)?),
            3 => (
                channel(0..1)? * 17,
                channel(1..2)? * 17,
                channel(2..3)? * 17,
            ),
            _ => return None,
        };
        Some(Self::from_rgb(red, green, blue))
    }

    /// Converts 8 bit rgb channels
    pub fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        let red = f64::from(red) / 255.0;
        let green = f64::from(green) / 255.0;
        let blue = f64::from(blue) / 255.0;

        let max = red.max(green).max(blue);
        let min = red.min(green).min(blue);
        let delta = max - min;
        let lightness = (max + min) / 2.0;

        if delta == 0.0 {
            return Self {
                hue: 0.0,
                saturation: 0.0,
                lightness,
            };
        }

        let saturation = delta / (1.0 - (2.0 * lightness - 1.0).abs());
        let hue = if max == red {
            60.0 * ((green - blue) / delta).rem_euclid(6.0)
        } else if max == green {
            60.0 * ((blue - red) / delta + 2.0)
        } else {
            60.0 * ((red - green) / delta + 4.0)
        };

        Self {
            hue,
            saturation,
            lightness,
        }
    }

    /// Formats the color as css custom property value: `"217 91% 60%"`
    pub fn to_css(&self) -> String {
        format!(
            "{} {}% {}%",
            self.hue.round(),
            (self.saturation * 100.0).round(),
            (self.lightness * 100.0).round()
        )
    }
}

/// Color of text drawn on the primary color
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Foreground {
    /// For light primary colors
    Dark,
    /// For dark primary colors
    Light,
}

impl Foreground {
    /// Picks the foreground readable on a color with `lightness`
    pub fn for_lightness(lightness: f64) -> Self {
        if lightness > DARK_FOREGROUND_THRESHOLD {
            Foreground::Dark
        } else {
            Foreground::Light
        }
    }

    /// The foreground as css custom property value
    pub fn to_css(self) -> &'static str {
        match self {
            Foreground::Dark => "222 47% 11%",
            Foreground::Light => "210 40% 98%",
        }
    }
}

/// Produces cache-busting tokens
pub trait FreshnessSource: Send + Sync {
    /// A token different from every token returned before
    fn next_token(&self) -> String;
}

/// [`FreshnessSource`] counting up from 1
#[derive(Debug, Default)]
pub struct CounterFreshness(AtomicU64);

impl FreshnessSource for CounterFreshness {
    fn next_token(&self) -> String {
        (self.0.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

/// [`FreshnessSource`] using the current unix time in milliseconds
///
/// Two tokens taken within the same millisecond are still distinct.
#[derive(Debug, Default)]
pub struct ClockFreshness {
    last: AtomicU64,
}

impl FreshnessSource for ClockFreshness {
    fn next_token(&self) -> String {
        let now = u64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000)
            .unwrap_or_default();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1).to_string()
    }
}

/// An url with its cache-busting token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BustedUrl {
    /// The url without token
    pub base: String,
    /// The token appended as `?v=`
    pub token: String,
}

impl BustedUrl {
    /// The url to put into the page
    pub fn href(&self) -> String {
        let separator = if self.base.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}{FRESHNESS_PARAMETER}={}",
            self.base, self.token
        )
    }
}

/// Strips every cache-busting parameter from `url`, keeping the other query pairs
pub fn base_path(url: &str) -> Cow<'_, str> {
    let Some((path, query)) = url.split_once('?') else {
        return Cow::Borrowed(url);
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty() && pair.split('=').next() != Some(FRESHNESS_PARAMETER))
        .collect();
    if kept.is_empty() {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("{path}?{}", kept.join("&")))
    }
}

/// The branding relevant values of a settings snapshot with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct BrandingFields {
    /// The company's name
    pub company_name: String,
    /// The primary color as given, `#rrggbb`
    pub color: String,
    /// The theme's name
    pub theme: String,
    /// The document title
    pub title: String,
    /// The meta description
    pub description: Option<String>,
    /// The favicon's url without cache-busting token
    pub favicon: Option<String>,
    /// The logo's url without cache-busting token
    pub logo: Option<String>,
}

impl BrandingFields {
    /// Reads the branding from a settings snapshot
    ///
    /// Missing or non-string values fall back to the defaults.
    pub fn from_settings(settings: &SettingsMap) -> Self {
        let string = |key: &str| {
            settings
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let company_name =
            string(setting_keys::COMPANY_NAME).unwrap_or_else(|| DEFAULT_COMPANY_NAME.to_string());
        let color = match string(setting_keys::PRIMARY_COLOR) {
            Some(color) if Hsl::from_hex(&color).is_some() => color,
            Some(color) => {
                warn!(branding.color = color.as_str(), "Invalid primary color, using default");
                DEFAULT_PRIMARY_COLOR.to_string()
            }
            None => DEFAULT_PRIMARY_COLOR.to_string(),
        };

        Self {
            theme: string(setting_keys::THEME).unwrap_or_else(|| DEFAULT_THEME.to_string()),
            title: string(setting_keys::SITE_TITLE).unwrap_or_else(|| company_name.clone()),
            description: string(setting_keys::SITE_DESCRIPTION),
            favicon: string(setting_keys::FAVICON_PATH).map(|url| base_path(&url).into_owned()),
            logo: string(setting_keys::LOGO_PATH).map(|url| base_path(&url).into_owned()),
            company_name,
            color,
        }
    }

    /// The branding used when the settings can't be fetched
    pub fn defaults() -> Self {
        Self::from_settings(&SettingsMap::new())
    }
}

/// The branding currently applied to the page
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BrandingState {
    /// Nothing has been applied yet
    #[default]
    Uninitialized,
    /// The effects of these fields have been applied
    Applied(AppliedBranding),
}

/// The fields of the applied branding and the tokens of its urls
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedBranding {
    /// The fields which were applied
    pub fields: BrandingFields,
    /// The favicon's url with its token
    pub favicon: Option<BustedUrl>,
    /// The logo's url with its token
    pub logo: Option<BustedUrl>,
}

/// How the logo is shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoSource {
    /// Show the uploaded image
    Image {
        /// The image's url including its cache-busting token
        src: String,
    },
    /// Show a letter instead
    Placeholder {
        /// The first letter of the company name
        letter: char,
    },
}

impl LogoSource {
    /// The placeholder for `company_name`
    pub fn placeholder(company_name: &str) -> Self {
        let letter = company_name
            .chars()
            .find(|letter| letter.is_alphanumeric())
            .map(|letter| letter.to_uppercase().next().unwrap_or(letter))
            .unwrap_or('?');
        LogoSource::Placeholder { letter }
    }

    /// The source to use after the image at `src` failed to load
    pub fn image_failed(src: &str, company_name: &str) -> Self {
        warn!(branding.logo = src, "Logo failed to load, showing placeholder");
        Self::placeholder(company_name)
    }
}

/// What a page has to change to show the branding
#[derive(Debug, Clone, PartialEq)]
pub struct BrandingEffects {
    /// The document title
    pub title: String,
    /// The meta description
    pub description: Option<String>,
    /// The favicon link's `href`
    pub favicon_href: Option<String>,
    /// What to show as logo
    pub logo: LogoSource,
    /// The theme's name, e.g. set as class on the document
    pub theme: String,
    /// Css custom properties to set on the document root
    pub css_variables: Vec<(String, String)>,
    /// The company's name, used when the logo fails to load
    pub company_name: String,
}

/// Computes the branding for `settings`
///
/// Returns `None` if the branding relevant fields equal the applied ones,
/// the page is up to date then.
/// Otherwise returns the new state and the effects to apply.
///
/// A url keeps its token as long as its base path stays the same,
/// only a changed path takes a new token from `freshness`.
pub fn apply_branding(
    prior: &BrandingState,
    settings: &SettingsMap,
    freshness: &dyn FreshnessSource,
) -> Option<(BrandingState, BrandingEffects)> {
    let fields = BrandingFields::from_settings(settings);

    let (prior_favicon, prior_logo) = match prior {
        BrandingState::Applied(applied) if applied.fields == fields => return None,
        BrandingState::Applied(applied) => (applied.favicon.as_ref(), applied.logo.as_ref()),
        BrandingState::Uninitialized => (None, None),
    };

    let bust = |base: &Option<String>, prior: Option<&BustedUrl>| {
        base.as_ref().map(|base| match prior {
            Some(prior) if prior.base == *base => prior.clone(),
            _ => BustedUrl {
                base: base.clone(),
                token: freshness.next_token(),
            },
        })
    };
    let favicon = bust(&fields.favicon, prior_favicon);
    let logo = bust(&fields.logo, prior_logo);

    // Validated by `BrandingFields::from_settings`
    let hsl = Hsl::from_hex(&fields.color)
        .or_else(|| Hsl::from_hex(DEFAULT_PRIMARY_COLOR))
        .unwrap_or(Hsl {
            hue: 0.0,
            saturation: 0.0,
            lightness: 0.5,
        });
    let foreground = Foreground::for_lightness(hsl.lightness);

    let effects = BrandingEffects {
        title: fields.title.clone(),
        description: fields.description.clone(),
        favicon_href: favicon.as_ref().map(BustedUrl::href),
        logo: match &logo {
            Some(logo) => LogoSource::Image { src: logo.href() },
            None => LogoSource::placeholder(&fields.company_name),
        },
        theme: fields.theme.clone(),
        css_variables: vec![
            ("--primary".to_string(), hsl.to_css()),
            (
                "--primary-foreground".to_string(),
                foreground.to_css().to_string(),
            ),
            ("--ring".to_string(), hsl.to_css()),
        ],
        company_name: fields.company_name.clone(),
    };

    Some((
        BrandingState::Applied(AppliedBranding {
            fields,
            favicon,
            logo,
        }),
        effects,
    ))
}

impl BrandingState {
    /// Applies `settings` in place, see [`apply_branding`]
    pub fn apply(
        &mut self,
        settings: &SettingsMap,
        freshness: &dyn FreshnessSource,
    ) -> Option<BrandingEffects> {
        let (next, effects) = apply_branding(self, settings, freshness)?;
        *self = next;
        Some(effects)
    }
}

/// The settings to brand a page with
///
/// A failed fetch falls back to the defaults.
pub fn settings_or_defaults(state: &ResourceState) -> SettingsMap {
    match (&state.value, &state.error) {
        (Some(value), _) => value.as_settings().cloned().unwrap_or_default(),
        (None, Some(error)) => {
            warn!(error.display = %error, "Failed to fetch settings, using default branding");
            SettingsMap::new()
        }
        (None, None) => SettingsMap::new(),
    }
}

/// Keeps the branding of every open view in sync with the public settings
///
/// Views call [`BrandingPropagator::watch`] and apply each new [`BrandingEffects`].
pub struct BrandingPropagator<F> {
    state: BrandingState,
    freshness: F,
    sender: watch::Sender<Option<BrandingEffects>>,
}

impl<F: FreshnessSource> BrandingPropagator<F> {
    /// Constructs a propagator which hasn't applied anything yet
    pub fn new(freshness: F) -> Self {
        Self {
            state: BrandingState::Uninitialized,
            freshness,
            sender: watch::Sender::new(None),
        }
    }

    /// Receives the effects of every branding change
    pub fn watch(&self) -> watch::Receiver<Option<BrandingEffects>> {
        self.sender.subscribe()
    }

    /// The currently applied state
    pub fn state(&self) -> &BrandingState {
        &self.state
    }

    /// Applies a settings resource's state, broadcasting the effects if anything changed
    ///
    /// Nothing happens while the first fetch is still running.
    pub fn update(&mut self, resource: &ResourceState) -> bool {
        if resource.value.is_none() && resource.error.is_none() {
            return false;
        }
        let settings = settings_or_defaults(resource);
        match self.state.apply(&settings, &self.freshness) {
            Some(effects) => {
                self.sender.send_replace(Some(effects));
                true
            }
            None => false,
        }
    }

    /// Follows the public settings of `cache` until the cache is dropped
    pub async fn run<A: VitrineApi>(mut self, cache: ResourceCache<A>) -> ClientError {
        let mut subscription = cache.subscribe(ResourceKey::PublicSettings);
        drop(cache);
        let mut state = subscription.current();
        loop {
            self.update(&state);
            state = match subscription.changed().await {
                Ok(state) => state,
                Err(error) => return error,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> SettingsMap {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), json!(value)))
            .collect()
    }

    #[test]
    fn hex_to_hsl() {
        let hsl = Hsl::from_hex("#ff0000").unwrap();
        assert_eq!((hsl.hue, hsl.saturation, hsl.lightness), (0.0, 1.0, 0.5));

        let hsl = Hsl::from_hex("#3b82f6").unwrap();
        assert_eq!(hsl.to_css(), "217 91% 60%");

        assert_eq!(Hsl::from_hex("fff").unwrap().lightness, 1.0);
        assert!(Hsl::from_hex("#12345").is_none());
        assert!(Hsl::from_hex("#gg0000").is_none());
        assert!(Hsl::from_hex("#+f+f+f").is_none());
        assert!(Hsl::from_hex("+f+").is_none());
    }

    #[test]
    fn base_path_keeps_other_query_pairs() {
        assert_eq!(base_path("/logo.png"), "/logo.png");
        assert_eq!(base_path("/logo.png?v=3"), "/logo.png");
        assert_eq!(base_path("/logo.png?v=3&w=64"), "/logo.png?w=64");
        assert_eq!(base_path("/logo.png?w=64&v=3&v=4"), "/logo.png?w=64");

        // Only the token differs, the applied url stays the same
        let freshness = CounterFreshness::default();
        let mut state = BrandingState::Uninitialized;
        let effects = state
            .apply(&settings(&[("logoPath", "/logo.png?v=3&w=64")]), &freshness)
            .unwrap();
        assert_eq!(
            effects.logo,
            LogoSource::Image {
                src: "/logo.png?w=64&v=1".to_string()
            }
        );
        assert!(state
            .apply(&settings(&[("logoPath", "/logo.png?w=64&v=9")]), &freshness)
            .is_none());
    }

    #[test]
    fn foreground_threshold() {
        assert_eq!(Foreground::for_lightness(0.61), Foreground::Dark);
        assert_eq!(Foreground::for_lightness(0.6), Foreground::Light);
        assert_eq!(Foreground::for_lightness(0.59), Foreground::Light);
    }

    #[test]
    fn same_snapshot_twice_is_a_no_op() {
        let freshness = CounterFreshness::default();
        let snapshot = settings(&[
            ("logoPath", "/uploads/logo-1.png"),
            ("faviconPath", "/uploads/favicon-1.ico"),
        ]);

        let mut state = BrandingState::Uninitialized;
        let effects = state.apply(&snapshot, &freshness).unwrap();
        assert_eq!(
            effects.logo,
            LogoSource::Image {
                src: "/uploads/logo-1.png?v=2".to_string()
            }
        );
        assert_eq!(
            effects.favicon_href.as_deref(),
            Some("/uploads/favicon-1.ico?v=1")
        );

        let before = state.clone();
        assert!(state.apply(&snapshot, &freshness).is_none());
        assert_eq!(state, before);
    }

    #[test]
    fn token_changes_only_with_the_base_path() {
        let freshness = CounterFreshness::default();
        let mut state = BrandingState::Uninitialized;
        state.apply(
            &settings(&[("logoPath", "/uploads/logo-1.png"), ("primaryColor", "#000000")]),
            &freshness,
        );

        // A different color keeps the logo's token
        let effects = state
            .apply(
                &settings(&[("logoPath", "/uploads/logo-1.png"), ("primaryColor", "#ffffff")]),
                &freshness,
            )
            .unwrap();
        assert_eq!(
            effects.logo,
            LogoSource::Image {
                src: "/uploads/logo-1.png?v=1".to_string()
            }
        );

        // A token in the stored path is not a change
        assert!(state
            .apply(
                &settings(&[("logoPath", "/uploads/logo-1.png?v=77"), ("primaryColor", "#ffffff")]),
                &freshness,
            )
            .is_none());

        let effects = state
            .apply(
                &settings(&[("logoPath", "/uploads/logo-2.png"), ("primaryColor", "#ffffff")]),
                &freshness,
            )
            .unwrap();
        assert_eq!(
            effects.logo,
            LogoSource::Image {
                src: "/uploads/logo-2.png?v=2".to_string()
            }
        );
    }

    #[test]
    fn css_variables_follow_the_primary_color() {
        let mut state = BrandingState::Uninitialized;
        let effects = state
            .apply(&settings(&[("primaryColor", "#fde68a")]), &CounterFreshness::default())
            .unwrap();
        let variables: std::collections::HashMap<_, _> = effects.css_variables.into_iter().collect();
        assert_eq!(variables["--primary-foreground"], Foreground::Dark.to_css());

        let effects = state
            .apply(&settings(&[("primaryColor", "#1e3a8a")]), &CounterFreshness::default())
            .unwrap();
        let variables: std::collections::HashMap<_, _> = effects.css_variables.into_iter().collect();
        assert_eq!(variables["--primary-foreground"], Foreground::Light.to_css());
    }

    #[test]
    fn defaults_and_placeholder() {
        let mut state = BrandingState::Uninitialized;
        let effects = state
            .apply(&settings(&[("primaryColor", "blue")]), &CounterFreshness::default())
            .unwrap();
        assert_eq!(effects.title, DEFAULT_COMPANY_NAME);
        assert_eq!(effects.theme, DEFAULT_THEME);
        assert_eq!(effects.logo, LogoSource::Placeholder { letter: 'V' });
        assert_eq!(
            effects.css_variables[0].1,
            Hsl::from_hex(DEFAULT_PRIMARY_COLOR).unwrap().to_css()
        );

        assert_eq!(
            LogoSource::image_failed("/uploads/logo-1.png?v=1", "acme corp"),
            LogoSource::Placeholder { letter: 'A' }
        );
    }

    #[test]
    fn title_defaults_to_company_name() {
        let fields = BrandingFields::from_settings(&settings(&[("companyName", "Acme")]));
        assert_eq!(fields.title, "Acme");
        let fields = BrandingFields::from_settings(&settings(&[
            ("companyName", "Acme"),
            ("siteTitle", "Acme | Repairs"),
        ]));
        assert_eq!(fields.title, "Acme | Repairs");
    }

    #[test]
    fn clock_tokens_are_distinct() {
        let freshness = ClockFreshness::default();
        let first = freshness.next_token();
        let second = freshness.next_token();
        assert_ne!(first, second);
    }

    #[test]
    fn failed_fetch_uses_defaults() {
        let state = ResourceState {
            value: None,
            loading: false,
            error: Some(std::sync::Arc::new(ClientError::NotFound("gone".to_string()))),
        };
        let mut propagator = BrandingPropagator::new(CounterFreshness::default());
        let mut receiver = propagator.watch();
        assert!(propagator.update(&state));
        let effects = receiver.borrow_and_update().clone().unwrap();
        assert_eq!(effects, {
            let mut state = BrandingState::Uninitialized;
            state
                .apply(&SettingsMap::new(), &CounterFreshness::default())
                .unwrap()
        });
        assert!(!propagator.update(&state));
    }
}
