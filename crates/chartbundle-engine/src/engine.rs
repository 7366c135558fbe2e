//! Template engine based on MiniJinja

use chartbundle_core::{BoxError, Chart, TemplateRenderer, Values};
use indexmap::IndexMap;
use minijinja::Environment;

use crate::context::{ReleaseInfo, RenderContext};
use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::functions::{self, DEFINES_TEMPLATE};
use crate::gotemplate::{self, ConvertedTree};

const TEMPLATES_DIR: &str = "templates/";
const CHARTS_DIR: &str = "charts";
const NOTES_FILE: &str = "notes.txt";

/// Result of rendering a chart tree
#[derive(Debug, Default)]
pub struct RenderResult {
    /// Rendered manifests keyed by `<root>/templates/x.yaml` or
    /// `<root>/charts/<sub>/templates/y.yaml`
    pub manifests: IndexMap<String, String>,

    /// Root chart notes (if NOTES.txt exists)
    pub notes: Option<String>,
}

/// Template language chart sources are written in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemplateSyntax {
    /// Helm's Go templates, converted to MiniJinja before rendering
    #[default]
    GoTemplate,
    /// MiniJinja, rendered as is
    MiniJinja,
}

/// Template engine builder
#[derive(Default)]
pub struct EngineBuilder {
    strict_mode: bool,
    syntax: TemplateSyntax,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Template language of the charts to render
    pub fn syntax(mut self, syntax: TemplateSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Build the engine
    pub fn build(self) -> Engine {
        Engine {
            strict_mode: self.strict_mode,
            syntax: self.syntax,
        }
    }
}

/// The template engine
pub struct Engine {
    strict_mode: bool,
    syntax: TemplateSyntax,
}

impl Default for Engine {
    fn default() -> Self {
        EngineBuilder::new().build()
    }
}

impl Engine {
    /// Create an engine for Helm charts
    pub fn new(strict_mode: bool) -> Self {
        EngineBuilder::new().strict(strict_mode).build()
    }

    /// Create a builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Create a configured MiniJinja environment
    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        if self.strict_mode {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Chainable);
        }

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);
        env.add_filter("sha256sum", filters::sha256sum);

        if self.syntax == TemplateSyntax::GoTemplate {
            // Go prints a template's final newline
            env.set_keep_trailing_newline(true);
            env.add_function("range_pairs", functions::range_pairs);
            env.add_function("fail", functions::fail);
            env.add_function("tpl", functions::tpl);
            env.add_function("semver_compare", functions::semver_compare);
        }

        env
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        context: &RenderContext,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();

        let source = match self.syntax {
            TemplateSyntax::GoTemplate => {
                let converted = gotemplate::convert(template)
                    .map_err(|e| TemplateError::from_parse(e, template_name, template))?;
                format!(
                    "{}{}{}",
                    converted.macros,
                    gotemplate::prelude(template_name, ""),
                    converted.body
                )
            }
            TemplateSyntax::MiniJinja => template.to_string(),
        };

        env.add_template_owned(template_name.to_string(), source.clone())
            .map_err(|e| TemplateError::from_minijinja(e, template_name, &source))?;

        let tmpl = env
            .get_template(template_name)
            .map_err(|e| TemplateError::from_minijinja(e, template_name, &source))?;

        tmpl.render(context)
            .map_err(|e| EngineError::from(TemplateError::from_minijinja(e, template_name, &source)))
    }

    /// Render a chart and all of its bundled sub-charts
    ///
    /// `values` are merged over the root chart's defaults.
    pub fn render_chart(&self, chart: &Chart, values: &Values) -> Result<RenderResult> {
        let mut root_values = chart.values.clone();
        root_values.merge(values);

        let context = RenderContext::new(chart, root_values, ReleaseInfo::for_chart(chart));
        let mut result = RenderResult::default();

        match self.syntax {
            TemplateSyntax::GoTemplate => {
                let tree = gotemplate::convert_tree(chart)?;
                self.render_recursive(&tree.chart, &context, chart.name(), true, Some(&tree), &mut result)?;
            }
            TemplateSyntax::MiniJinja => {
                self.render_recursive(chart, &context, chart.name(), true, None, &mut result)?;
            }
        }

        tracing::debug!(
            chart = %chart.name(),
            manifests = result.manifests.len(),
            "rendered chart"
        );

        Ok(result)
    }

    fn render_recursive(
        &self,
        chart: &Chart,
        context: &RenderContext,
        prefix: &str,
        is_root: bool,
        tree: Option<&ConvertedTree>,
        result: &mut RenderResult,
    ) -> Result<()> {
        for subchart in &chart.dependencies {
            let sub_context = context.for_subchart(subchart);
            let sub_prefix = format!("{}/{}/{}", prefix, CHARTS_DIR, subchart.name());
            self.render_recursive(subchart, &sub_context, &sub_prefix, false, tree, result)?;
        }

        let rendered = self.render_templates(chart, context, prefix, tree)?;
        for (name, output) in rendered {
            if name.to_lowercase() == NOTES_FILE {
                if is_root {
                    result.notes = Some(output);
                }
                continue;
            }
            result
                .manifests
                .insert(format!("{}/{}{}", prefix, TEMPLATES_DIR, name), output);
        }

        Ok(())
    }

    /// Render the non-helper templates of one chart
    ///
    /// Returns output keyed by path relative to `templates/`. Templates that
    /// render to nothing (or only `---`) are dropped. Converted Helm
    /// templates get the tree's defines imported and `$` bound first.
    fn render_templates(
        &self,
        chart: &Chart,
        context: &RenderContext,
        prefix: &str,
        tree: Option<&ConvertedTree>,
    ) -> Result<Vec<(String, String)>> {
        let mut env = self.create_environment();

        let mut header = String::new();
        if let Some(tree) = tree {
            env.add_template_owned(DEFINES_TEMPLATE, tree.defines.clone())
                .map_err(|e| TemplateError::from_minijinja(e, DEFINES_TEMPLATE, &tree.defines))?;
            header = tree.import_statement(DEFINES_TEMPLATE);
        }

        // Load everything first so helpers can be imported and included
        let mut sources = IndexMap::new();
        for (path, content) in &chart.templates {
            let Some(name) = path.strip_prefix(TEMPLATES_DIR) else {
                continue;
            };
            let source = match tree {
                Some(_) => format!(
                    "{}{}{}",
                    header,
                    gotemplate::prelude(
                        &format!("{}/{}", prefix, path),
                        &format!("{}/{}", prefix, TEMPLATES_DIR.trim_end_matches('/'))
                    ),
                    content
                ),
                None => content.clone(),
            };
            env.add_template_owned(name.to_string(), source.clone())
                .map_err(|e| TemplateError::from_minijinja(e, path, &source))?;
            sources.insert(name.to_string(), (path.as_str(), source));
        }

        let mut output = Vec::new();
        if chart.is_library() {
            return Ok(output);
        }

        for (name, (path, source)) in &sources {
            let file_name = name.rsplit('/').next().unwrap_or(name);
            if file_name.starts_with('_') {
                continue;
            }

            let tmpl = env
                .get_template(name)
                .map_err(|e| TemplateError::from_minijinja(e, path, source))?;
            let rendered = tmpl
                .render(context)
                .map_err(|e| TemplateError::from_minijinja(e, path, source))?;

            let trimmed = rendered.trim();
            if trimmed.is_empty() || trimmed == "---" {
                continue;
            }
            output.push((name.clone(), rendered));
        }

        Ok(output)
    }
}

impl TemplateRenderer for Engine {
    fn render(&self, chart: &Chart, values: &Values) -> std::result::Result<IndexMap<String, String>, BoxError> {
        let result = self.render_chart(chart, values)?;
        Ok(result.manifests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateErrorKind;

    fn jinja(strict: bool) -> Engine {
        Engine::builder()
            .strict(strict)
            .syntax(TemplateSyntax::MiniJinja)
            .build()
    }

    fn create_test_context() -> RenderContext {
        let mut chart = Chart::new("mychart", "1.0.0");
        chart.metadata.app_version = Some("2.0.0".to_string());
        let values = Values::from_yaml(
            r#"
image:
  repository: nginx
  tag: "1.25"
replicas: 3
"#,
        )
        .unwrap();

        RenderContext::new(&chart, values, ReleaseInfo::for_chart(&chart))
    }

    fn chart_with_image() -> Chart {
        let mut chart = Chart::new("web", "0.1.0")
            .with_template(
                "templates/_helpers.tpl",
                "{% macro image(v) %}{{ v.repository }}:{{ v.tag }}{% endmacro %}",
            )
            .with_template(
                "templates/deployment.yaml",
                "{% import \"_helpers.tpl\" as h %}\nkind: Deployment\nspec:\n  containers:\n    - name: web\n      image: {{ h.image(values.image) | quote }}\n",
            )
            .with_template("templates/NOTES.txt", "Installed {{ chart.name }}")
            .with_template("templates/empty.yaml", "{% if values.enabled %}kind: X{% endif %}\n---\n");
        chart.values = Values::from_yaml("image:\n  repository: nginx\n  tag: \"1.25\"\n").unwrap();
        chart
    }

    fn helm_chart() -> Chart {
        let mut chart = Chart::new("web", "0.1.0")
            .with_template(
                "templates/_helpers.tpl",
                "{{- define \"web.fullname\" -}}\n{{ .Release.Name }}-{{ .Chart.Name | trunc 63 | trimSuffix \"-\" }}\n{{- end }}\n",
            )
            .with_template(
                "templates/deployment.yaml",
                concat!(
                    "apiVersion: apps/v1\n",
                    "kind: Deployment\n",
                    "metadata:\n",
                    "  name: {{ include \"web.fullname\" . }}\n",
                    "spec:\n",
                    "  replicas: {{ .Values.replicas | default 1 }}\n",
                    "  template:\n",
                    "    spec:\n",
                    "      containers:\n",
                    "        - name: {{ .Chart.Name }}\n",
                    "          image: \"{{ .Values.image.repository }}:{{ .Values.image.tag | default .Chart.AppVersion }}\"\n",
                    "          {{- with .Values.env }}\n",
                    "          env:\n",
                    "            {{- range $name, $value := . }}\n",
                    "            - name: {{ $name }}\n",
                    "              value: {{ $value | quote }}\n",
                    "            {{- end }}\n",
                    "          {{- end }}\n",
                ),
            )
            .with_template(
                "templates/service.yaml",
                "{{- if .Values.service.enabled }}\nkind: Service\n{{- end }}\n",
            )
            .with_template("templates/NOTES.txt", "Installed {{ .Release.Name }}.\n");
        chart.metadata.app_version = Some("2.0.0".to_string());
        chart.values = Values::from_yaml(
            "image:\n  repository: nginx\n  tag: \"\"\nenv:\n  B: two\n  A: one\nservice:\n  enabled: false\n",
        )
        .unwrap();
        chart
    }

    #[test]
    fn test_render_simple() {
        let engine = jinja(true);
        let ctx = create_test_context();

        let result = engine
            .render_string("replicas: {{ values.replicas }}", &ctx, "test.yaml")
            .unwrap();

        assert_eq!(result, "replicas: 3");
    }

    #[test]
    fn test_render_with_filters() {
        let engine = jinja(true);
        let ctx = create_test_context();

        let template = r#"image: {{ values.image | toyaml | nindent(2) }}"#;
        let result = engine.render_string(template, &ctx, "test.yaml").unwrap();

        assert!(result.contains("repository: nginx"));
        assert!(result.contains("tag:"));
    }

    #[test]
    fn test_render_chart_and_release_info() {
        let engine = jinja(false);
        let ctx = create_test_context();

        let template = "chart: {{ chart.name }}-{{ chart.version }}\napp: {{ chart.appVersion }}\nrelease: {{ release.name }}/{{ release.namespace }}";
        let result = engine.render_string(template, &ctx, "test.yaml").unwrap();

        assert!(result.contains("chart: mychart-1.0.0"));
        assert!(result.contains("app: 2.0.0"));
        assert!(result.contains("release: mychart/default"));
    }

    #[test]
    fn test_undefined_error_in_strict_mode() {
        let engine = jinja(true);
        let ctx = create_test_context();

        let result = engine.render_string("value: {{ values.undefined_key.nested }}", &ctx, "test.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_undefined_renders_empty_by_default() {
        let engine = jinja(false);
        let ctx = create_test_context();

        let result = engine
            .render_string("value: {{ values.undefined_key }}", &ctx, "test.yaml")
            .unwrap();
        assert_eq!(result, "value: ");
    }

    #[test]
    fn test_render_go_string() {
        let engine = Engine::default();
        let ctx = create_test_context();

        let result = engine
            .render_string(
                "image: {{ .Values.image.repository }}:{{ .Values.image.tag }}\nname: {{ $.Chart.Name }}-{{ .Chart.AppVersion }}\n",
                &ctx,
                "test.yaml",
            )
            .unwrap();
        assert_eq!(result, "image: nginx:1.25\nname: mychart-2.0.0\n");
    }

    #[test]
    fn test_render_chart_skips_helpers_notes_and_empty() {
        let engine = jinja(false);
        let result = engine.render_chart(&chart_with_image(), &Values::new()).unwrap();

        let keys: Vec<_> = result.manifests.keys().cloned().collect();
        assert_eq!(keys, vec!["web/templates/deployment.yaml"]);
        assert!(result.manifests["web/templates/deployment.yaml"].contains("image: \"nginx:1.25\""));
        assert_eq!(result.notes.as_deref(), Some("Installed web"));
    }

    #[test]
    fn test_caller_values_override_defaults() {
        let engine = jinja(false);
        let overrides = Values::from_yaml("image:\n  tag: \"1.27\"\n").unwrap();
        let result = engine.render_chart(&chart_with_image(), &overrides).unwrap();

        assert!(result.manifests["web/templates/deployment.yaml"].contains("nginx:1.27"));
    }

    #[test]
    fn test_render_helm_chart() {
        let result = Engine::default().render_chart(&helm_chart(), &Values::new()).unwrap();

        let keys: Vec<_> = result.manifests.keys().cloned().collect();
        assert_eq!(keys, vec!["web/templates/deployment.yaml"]);

        let deployment = &result.manifests["web/templates/deployment.yaml"];
        assert!(deployment.contains("  name: web-web\n"));
        assert!(deployment.contains("  replicas: 1\n"));
        assert!(deployment.contains("        - name: web\n"));
        assert!(deployment.contains("image: \"nginx:2.0.0\""));
        assert!(deployment.contains(
            "          env:\n            - name: A\n              value: \"one\"\n            - name: B\n              value: \"two\"\n"
        ));
        assert_eq!(result.notes.as_deref(), Some("Installed web.\n"));
    }

    #[test]
    fn test_helm_chart_with_overrides() {
        let overrides = Values::from_yaml("replicas: 3\nimage:\n  tag: \"1.27\"\nservice:\n  enabled: true\n").unwrap();
        let result = Engine::default().render_chart(&helm_chart(), &overrides).unwrap();

        let deployment = &result.manifests["web/templates/deployment.yaml"];
        assert!(deployment.contains("  replicas: 3\n"));
        assert!(deployment.contains("image: \"nginx:1.27\""));
        assert_eq!(result.manifests["web/templates/service.yaml"], "\nkind: Service\n");
    }

    #[test]
    fn test_defines_are_shared_across_the_tree() {
        let mut common = Chart::new("common", "2.0.0").with_template(
            "templates/_names.tpl",
            "{{- define \"common.name\" -}}{{ .Chart.Name }}{{- end -}}\n{{- define \"common.labels\" -}}\napp: {{ include \"common.name\" . }}\n{{- end -}}",
        );
        common.metadata.chart_type = Some("library".to_string());

        let redis = Chart::new("redis", "17.3.2").with_template(
            "templates/cm.yaml",
            "metadata:\n  labels:\n    {{- include \"common.labels\" . | nindent 4 }}\n",
        );

        let root = Chart::new("app", "1.0.0")
            .with_template("templates/cm.yaml", "labels:\n  {{- include \"common.labels\" . | nindent 2 }}\n")
            .with_dependency(common)
            .with_dependency(redis);

        let result = Engine::default().render_chart(&root, &Values::new()).unwrap();

        assert_eq!(result.manifests["app/templates/cm.yaml"], "labels:\n  app: app\n");
        assert_eq!(
            result.manifests["app/charts/redis/templates/cm.yaml"],
            "metadata:\n  labels:\n    app: redis\n"
        );
    }

    #[test]
    fn test_parent_define_wins() {
        let sub = Chart::new("sub", "1.0.0")
            .with_template("templates/_h.tpl", "{{ define \"name\" }}sub{{ end }}")
            .with_template("templates/x.yaml", "name: {{ template \"name\" }}\n");
        let root = Chart::new("app", "1.0.0")
            .with_template("templates/_h.tpl", "{{ define \"name\" }}app{{ end }}")
            .with_dependency(sub);

        let result = Engine::default().render_chart(&root, &Values::new()).unwrap();
        assert_eq!(result.manifests["app/charts/sub/templates/x.yaml"], "name: app\n");
    }

    #[test]
    fn test_tpl_and_template_objects() {
        let mut chart = Chart::new("app", "1.0.0").with_template(
            "templates/cm.yaml",
            "host: {{ tpl .Values.host . }}\nfile: {{ .Template.Name }}\nkube: {{ semverCompare \">=1.21-0\" .Capabilities.KubeVersion.GitVersion }}\n",
        );
        chart.values = Values::from_yaml("host: \"{{ .Release.Name }}.example.com\"\n").unwrap();

        let result = Engine::default().render_chart(&chart, &Values::new()).unwrap();
        assert_eq!(
            result.manifests["app/templates/cm.yaml"],
            "host: app.example.com\nfile: app/templates/cm.yaml\nkube: true\n"
        );
    }

    #[test]
    fn test_fail_surfaces_message() {
        let chart = Chart::new("app", "1.0.0").with_template(
            "templates/cm.yaml",
            "{{ if not .Values.tag }}{{ fail \"tag is required\" }}{{ end }}",
        );
        let err = Engine::default().render_chart(&chart, &Values::new()).unwrap_err();
        assert!(err.to_string().contains("tag is required"));
    }

    #[test]
    fn test_subchart_output_keys_and_scoped_values() {
        let mut sub = Chart::new("redis", "17.3.2")
            .with_template("templates/statefulset.yaml", "image: {{ values.image }}\nregistry: {{ values.global.registry }}\n");
        sub.values = Values::from_yaml("image: redis:7.0\n").unwrap();

        let mut root = Chart::new("app", "1.0.0")
            .with_template("templates/cm.yaml", "name: {{ release.name }}\n")
            .with_dependency(sub);
        root.values = Values::from_yaml("global:\n  registry: r.io\nredis:\n  image: redis:7.2\n").unwrap();

        let result = jinja(false).render_chart(&root, &Values::new()).unwrap();

        let sub_out = &result.manifests["app/charts/redis/templates/statefulset.yaml"];
        assert!(sub_out.contains("image: redis:7.2"));
        assert!(sub_out.contains("registry: r.io"));
        assert_eq!(result.manifests["app/templates/cm.yaml"], "name: app");
    }

    #[test]
    fn test_library_chart_renders_nothing() {
        let mut lib = Chart::new("common", "2.0.0").with_template("templates/x.yaml", "kind: X\n");
        lib.metadata.chart_type = Some("library".to_string());
        let root = Chart::new("app", "1.0.0").with_dependency(lib);

        let result = Engine::default().render_chart(&root, &Values::new()).unwrap();
        assert!(result.manifests.is_empty());
    }

    #[test]
    fn test_deeply_nested_subcharts_all_render() {
        let mut chart = Chart::new("c12", "1").with_template("templates/t.yaml", "kind: C12\n");
        for level in (0..12).rev() {
            chart = Chart::new(format!("c{}", level), "1")
                .with_template("templates/t.yaml", "kind: C\n")
                .with_dependency(chart);
        }

        let result = Engine::default().render_chart(&chart, &Values::new()).unwrap();

        assert_eq!(result.manifests.len(), 13);
        let deepest = (1..=12).fold("c0".to_string(), |prefix, level| {
            format!("{}/charts/c{}", prefix, level)
        });
        assert_eq!(
            result.manifests[&format!("{}/templates/t.yaml", deepest)],
            "kind: C12\n"
        );
    }

    #[test]
    fn test_syntax_error_names_template() {
        let root = Chart::new("app", "1.0.0").with_template("templates/bad.yaml", "a: 1\nb: {{ values.x \n");
        let err = jinja(false).render_chart(&root, &Values::new()).unwrap_err();

        let EngineError::Template(template_err) = err;
        assert_eq!(template_err.kind(), TemplateErrorKind::SyntaxError);
        assert!(format!("{:?}", template_err.src).contains("templates/bad.yaml"));
    }

    #[test]
    fn test_go_syntax_error_names_template() {
        let root = Chart::new("app", "1.0.0").with_template("templates/bad.yaml", "a: 1\nb: {{ .Values.x \n");
        let err = Engine::default().render_chart(&root, &Values::new()).unwrap_err();

        let EngineError::Template(template_err) = err;
        assert_eq!(template_err.kind(), TemplateErrorKind::SyntaxError);
        assert!(template_err.message.starts_with("templates/bad.yaml: "));
        assert_eq!(template_err.span.unwrap().offset(), 8);
    }

    #[test]
    fn test_renderer_trait_returns_manifests() {
        let renderer: &dyn TemplateRenderer = &jinja(false);
        let out = renderer.render(&chart_with_image(), &Values::new()).unwrap();
        assert_eq!(out.len(), 1);
    }
}
