//! Compiled route-template table.
//!
//! Each `{param}` placeholder becomes a single-segment wildcard (`[^/]+`), the
//! literal text around it is escaped, and the whole template is anchored, so
//! a path matches only when every segment lines up.
//!
//! Overlapping templates are resolved by a fixed specificity order rather
//! than by storage order:
//!
//! 1. more literal segments first,
//! 2. then the template whose first placeholder appears later,
//! 3. then lexicographic template text (tie-break for determinism).

use regex::Regex;
use relay_kernel::RouteTemplate;
use std::cmp::Reverse;
use std::sync::LazyLock;
use std::time::Duration;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}/]+\}").expect("static placeholder pattern"));

/// A successful lookup: the winning template and its cache TTL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub template: String,
    /// `None` when the template leaves the TTL to the gateway default.
    pub ttl: Option<Duration>,
}

struct CompiledRoute {
    template: RouteTemplate,
    pattern: Regex,
}

/// Immutable, specificity-ordered set of active templates.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile the active templates in `templates`. Inactive templates and
    /// templates that fail to compile are skipped (the latter with a warning).
    pub fn build(templates: impl IntoIterator<Item = RouteTemplate>) -> Self {
        let mut routes: Vec<CompiledRoute> = templates
            .into_iter()
            .filter(|t| t.status.is_active())
            .filter_map(|template| match compile(&template.path_template) {
                Ok(pattern) => Some(CompiledRoute { template, pattern }),
                Err(e) => {
                    tracing::warn!(
                        template = %template.path_template,
                        error = %e,
                        "skipping route template that does not compile"
                    );
                    None
                }
            })
            .collect();

        routes.sort_by(|a, b| {
            let key = |r: &CompiledRoute| {
                (
                    Reverse(r.template.literal_segment_count()),
                    Reverse(r.template.first_placeholder_index()),
                )
            };
            key(a)
                .cmp(&key(b))
                .then_with(|| a.template.path_template.cmp(&b.template.path_template))
        });

        Self { routes }
    }

    /// Most specific active template matching `path`, if any.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        self.routes
            .iter()
            .find(|r| r.pattern.is_match(path))
            .map(|r| RouteMatch {
                template: r.template.path_template.clone(),
                ttl: r.template.max_cache_seconds.map(Duration::from_secs),
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Templates in match order.
    pub fn templates(&self) -> impl Iterator<Item = &RouteTemplate> {
        self.routes.iter().map(|r| &r.template)
    }
}

fn compile(template: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(template.len() + 16);
    pattern.push('^');
    let mut last = 0;
    for m in PLACEHOLDER.find_iter(template) {
        pattern.push_str(&regex::escape(&template[last..m.start()]));
        pattern.push_str("[^/]+");
        last = m.end();
    }
    pattern.push_str(&regex::escape(&template[last..]));
    pattern.push('$');
    Regex::new(&pattern)
}

// =============================================================================
// Tests
// =============================================================================
