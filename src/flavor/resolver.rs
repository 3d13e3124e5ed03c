//! Flavor lookup

use super::{BuildFlavor, Composer, Drupal, NoBuild, NodeJs};
use crate::app::AppConfig;
use crate::error::{PlatformError, PlatformResult};

/// Every known flavor, in lookup order
pub fn all_flavors() -> Vec<Box<dyn BuildFlavor>> {
    vec![
        Box::new(Composer),
        Box::new(NodeJs),
        Box::new(Drupal),
        Box::new(NoBuild),
    ]
}

/// Select the flavor for an application's configuration.
///
/// An explicit `build.flavor` must match a flavor supporting the app's
/// runtime type. Without one, the runtime type's default flavor is used,
/// and anything unknown builds with no flavor.
pub fn resolve(config: &AppConfig) -> PlatformResult<Box<dyn BuildFlavor>> {
    let stack = config.stack_type();
    let Some(stack_name) = stack else {
        if let Some(flavor) = config.flavor.as_deref().filter(|f| *f != "none" && *f != "default") {
            return Err(PlatformError::UnsupportedFlavor {
                flavor: flavor.to_string(),
                stack: String::new(),
            });
        }
        return Ok(Box::new(NoBuild));
    };

    let key = config.flavor.as_deref().unwrap_or("default");
    all_flavors()
        .into_iter()
        .find(|flavor| flavor.supports(key, stack))
        .ok_or_else(|| PlatformError::UnsupportedFlavor {
            flavor: key.to_string(),
            stack: stack_name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flavor_of(yaml: &str) -> PlatformResult<&'static str> {
        let config = AppConfig::from_value(serde_yaml::from_str(yaml).unwrap()).unwrap();
        resolve(&config).map(|f| f.name())
    }

    #[test]
    fn defaults_follow_runtime_type() {
        assert_eq!(flavor_of("type: 'php:8.2'").unwrap(), "composer");
        assert_eq!(flavor_of("type: 'nodejs:20'").unwrap(), "nodejs");
        assert_eq!(flavor_of("type: 'golang:1.22'").unwrap(), "none");
        assert_eq!(flavor_of("{}").unwrap(), "none");
    }

    #[test]
    fn explicit_flavors() {
        assert_eq!(flavor_of("toolstack: 'php:drupal'").unwrap(), "drupal");
        assert_eq!(flavor_of("{type: 'nodejs:20', build: {flavor: none}}").unwrap(), "none");
        assert_eq!(flavor_of("{type: 'php:8.3', build: {flavor: composer}}").unwrap(), "composer");
    }

    #[test]
    fn unknown_flavor_is_unsupported() {
        let err = flavor_of("{type: 'php:8.2', build: {flavor: rails}}").unwrap_err();
        match err {
            PlatformError::UnsupportedFlavor { flavor, stack } => {
                assert_eq!(flavor, "rails");
                assert_eq!(stack, "php");
            }
            other => panic!("unexpected error: {other}"),
        }
        // A flavor that exists, but not for this runtime
        assert!(flavor_of("{type: 'nodejs:20', build: {flavor: drupal}}").is_err());
    }
}
