use super::hooks::{HookArgs, HookCallback, Hooks, hook};
use super::monitor::{Location, Monitor, MonitorConfig, MonitorFilter};
use super::step::{Step, StepContext};
use crate::config::Params;
use crate::utils::GlobSet;
use std::future::Future;
use std::sync::Arc;

pub type DescribeFn = Arc<dyn Fn(&mut JourneyBuilder<'_>) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct JourneyOptions {
    pub name: String,
    pub id: Option<String>,
    pub tags: Vec<String>,
}

impl JourneyOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

impl From<&str> for JourneyOptions {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for JourneyOptions {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A named scenario. Its steps are not stored: they are produced by
/// replaying the describe function, once per run and once per monitor build.
#[derive(Clone)]
pub struct Journey {
    pub name: String,
    pub id: String,
    pub tags: Vec<String>,
    pub location: Option<Location>,
    content: String,
    describe: DescribeFn,
}

/// Output of one registration replay.
#[derive(Debug)]
pub struct JourneyPlan {
    pub steps: Vec<Step>,
    pub hooks: Hooks,
    pub monitor: Monitor,
}

impl Journey {
    #[track_caller]
    pub fn new<F>(options: impl Into<JourneyOptions>, describe: F) -> Self
    where
        F: Fn(&mut JourneyBuilder<'_>) + Send + Sync + 'static,
    {
        let options = options.into();
        Self {
            id: options.id.unwrap_or_else(|| options.name.clone()),
            name: options.name,
            tags: options.tags,
            location: Some(Location::from(std::panic::Location::caller())),
            content: String::new(),
            describe: Arc::new(describe),
        }
    }

    /// Source text of the journey, hashed into the monitor to detect edits.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replays the describe function against a fresh builder.
    pub fn describe(&self, params: &Params) -> JourneyPlan {
        let mut builder = JourneyBuilder::new(params);
        (self.describe)(&mut builder);
        let monitor = self.build_monitor(builder.monitor.take().unwrap_or_default());
        JourneyPlan {
            steps: builder.steps,
            hooks: builder.hooks,
            monitor,
        }
    }

    fn build_monitor(&self, overrides: MonitorConfig) -> Monitor {
        let defaults = MonitorConfig {
            name: Some(self.name.clone()),
            id: Some(self.id.clone()),
            monitor_type: Some("browser".to_string()),
            tags: Some(self.tags.clone()),
            ..MonitorConfig::default()
        };
        let mut monitor = Monitor::new(defaults.overlay(overrides));
        monitor.set_source(self.location.clone());
        monitor.set_content(self.content.clone());
        monitor.set_filter(MonitorFilter {
            match_pattern: self.name.clone(),
        });
        monitor
    }

    /// Tag patterns take precedence: when given, only tags are matched. A
    /// name pattern matches the journey name or any of its tags. Without
    /// patterns everything matches.
    pub fn is_match(&self, match_pattern: Option<&str>, tags_pattern: Option<&[String]>) -> bool {
        if let Some(tags) = tags_pattern
            && !tags.is_empty()
        {
            return self.tags_match(tags);
        }
        if let Some(pattern) = match_pattern {
            let name_match = GlobSet::new(&[pattern])
                .map(|set| set.is_match(&self.name))
                .unwrap_or(false);
            return name_match || self.tags_match(&[pattern]);
        }
        true
    }

    fn tags_match<S: AsRef<str>>(&self, patterns: &[S]) -> bool {
        let wildcard = ["*".to_string()];
        let tags: &[String] = if self.tags.is_empty() {
            &wildcard
        } else {
            &self.tags
        };
        match GlobSet::new(patterns) {
            Ok(set) => !set.matches(tags).is_empty(),
            Err(e) => {
                tracing::warn!(journey = %self.name, "Ignoring invalid tag pattern: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for Journey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journey")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("tags", &self.tags)
            .field("location", &self.location)
            .finish()
    }
}

/// Registration context handed to a journey's describe function.
pub struct JourneyBuilder<'a> {
    params: &'a Params,
    steps: Vec<Step>,
    hooks: Hooks,
    monitor: Option<MonitorConfig>,
}

impl<'a> JourneyBuilder<'a> {
    fn new(params: &'a Params) -> Self {
        Self {
            params,
            steps: Vec::new(),
            hooks: Hooks::default(),
            monitor: None,
        }
    }

    pub fn params(&self) -> &Params {
        self.params
    }

    #[track_caller]
    pub fn step<F, Fut>(&mut self, name: impl Into<String>, callback: F) -> &mut Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let location = Location::from(std::panic::Location::caller());
        let index = self.steps.len() + 1;
        self.steps.push(Step::new(
            name,
            index,
            Arc::new(move |ctx| Box::pin(callback(ctx))),
            Some(location),
        ));
        self
    }

    pub fn before<F, Fut>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.before.push(hook(callback));
        self
    }

    pub fn after<F, Fut>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.after.push(hook(callback));
        self
    }

    pub fn add_hook(&mut self, kind: super::HookKind, callback: HookCallback) -> &mut Self {
        match kind {
            super::HookKind::Before => self.hooks.before.push(callback),
            super::HookKind::After => self.hooks.after.push(callback),
            other => tracing::warn!("{} hooks belong to the runner, ignoring", other),
        }
        self
    }

    /// Journey-specific monitor settings; the last call wins.
    pub fn monitor(&mut self, config: MonitorConfig) -> &mut Self {
        self.monitor = Some(config);
        self
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}
