//! Rewrite templates with named placeholders.
//!
//! A template is parsed once into literal text and placeholder segments.
//! Placeholders are `%{node}` (the node's own, already rewritten, source),
//! `%{local}` (a temporary unique to the node) and `%{<tracker>_tracker}`
//! for each tracker the owning node declares. Anything else is rejected
//! when the template is parsed, so substitution itself cannot fail.

use super::kind::TrackerName;
use super::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Node,
    Local,
    Tracker(TrackerName),
}

/// A parsed template, split around its single `%{node}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    before: Vec<Segment>,
    after: Vec<Segment>,
}

/// Values substituted into a template.
pub struct Bindings<'a> {
    pub local: &'a str,
    pub tracker_source: &'a dyn Fn(TrackerName) -> Option<String>,
}

impl Template {
    /// Parse `source`, accepting tracker placeholders only for `trackers`.
    pub fn parse(source: &str, trackers: &[TrackerName]) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("%{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open
                .find('}')
                .ok_or_else(|| TemplateError::UnterminatedPlaceholder {
                    template: source.to_string(),
                })?;
            let name = &after_open[..end];
            segments.push(placeholder(name, trackers).ok_or_else(|| {
                TemplateError::UnknownPlaceholder {
                    name: name.to_string(),
                    template: source.to_string(),
                }
            })?);
            rest = &after_open[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        let node_positions: Vec<usize> = segments
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == Segment::Node)
            .map(|(i, _)| i)
            .collect();
        let &[split] = node_positions.as_slice() else {
            return Err(TemplateError::NodePlaceholder {
                template: source.to_string(),
            });
        };

        let after = segments.split_off(split + 1);
        segments.pop();
        Ok(Self {
            before: segments,
            after,
        })
    }

    /// Render the text emitted before and after the node's own source.
    ///
    /// Returns `None` if a tracker the template names has no slot.
    pub fn render(&self, bindings: &Bindings<'_>) -> Option<(String, String)> {
        Some((
            render_segments(&self.before, bindings)?,
            render_segments(&self.after, bindings)?,
        ))
    }
}

fn placeholder(name: &str, trackers: &[TrackerName]) -> Option<Segment> {
    match name {
        "node" => Some(Segment::Node),
        "local" => Some(Segment::Local),
        _ => trackers
            .iter()
            .find(|t| t.placeholder() == name)
            .map(|&t| Segment::Tracker(t)),
    }
}

fn render_segments(segments: &[Segment], bindings: &Bindings<'_>) -> Option<String> {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Local => out.push_str(bindings.local),
            Segment::Tracker(name) => out.push_str(&(bindings.tracker_source)(*name)?),
            // Only one node placeholder exists and it is the split point.
            Segment::Node => {}
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::kind::CHECK_COMPLETION;

    fn probe(name: TrackerName) -> Option<String> {
        match name {
            TrackerName::Completion => Some("$c[0][7]+=1".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_check_completion_template() {
        let template = Template::parse(CHECK_COMPLETION, &[TrackerName::Completion]).unwrap();
        let bindings = Bindings {
            local: "_dc_l3",
            tracker_source: &probe,
        };
        let (prefix, suffix) = template.render(&bindings).unwrap();
        assert_eq!(prefix, "(_dc_l3=(");
        assert_eq!(suffix, ");$c[0][7]+=1;_dc_l3=_dc_l3)");
    }

    #[test]
    fn test_undeclared_tracker_is_rejected() {
        let err = Template::parse("(%{reader_tracker};%{node})", &[TrackerName::Completion])
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnknownPlaceholder { ref name, .. } if name == "reader_tracker"));
    }

    #[test]
    fn test_node_placeholder_must_appear_once() {
        assert!(matches!(
            Template::parse("(%{local})", &[]),
            Err(TemplateError::NodePlaceholder { .. })
        ));
        assert!(matches!(
            Template::parse("%{node};%{node}", &[]),
            Err(TemplateError::NodePlaceholder { .. })
        ));
        assert!(matches!(
            Template::parse("(%{node", &[]),
            Err(TemplateError::UnterminatedPlaceholder { .. })
        ));
    }

    #[test]
    fn test_missing_slot_renders_nothing() {
        let template = Template::parse("(%{completion_tracker};%{node})", &[TrackerName::Completion])
            .unwrap();
        let none = |_: TrackerName| -> Option<String> { None };
        let bindings = Bindings {
            local: "_l",
            tracker_source: &none,
        };
        assert_eq!(template.render(&bindings), None);
    }
}
