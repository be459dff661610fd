//! Include expansion on the canonical tree.
//!
//! Each `<include>` is replaced, depth first and in document order, by the
//! single entity of the fragment it names. References inside the fragment
//! are qualified with the fragment root's scope path, so that once the
//! subtree is spliced they still name the fragment's own frames.

use std::collections::HashSet;
use std::mem;

use nalgebra::Isometry3;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::error::{Result, SdfError};
use crate::fetch::ModelFetch;
use crate::graph::FrameGraph;
use crate::normalize::{normalize_element, top_level_entities};
use crate::types::{
    CanonicalElement, ElementKind, FrameRef, IncludeAttrs, MODEL_FRAME, WORLD_FRAME,
};
use crate::version::FormatVersion;

/// Expand every include directive below `root`, in place.
///
/// # Errors
///
/// - [`SdfError::UnresolvableInclude`] if a fragment cannot be fetched, holds
///   other than exactly one model, actor or light, or nesting is too deep
/// - [`SdfError::NameCollision`] if an included entity's name is already
///   used by a sibling
/// - [`SdfError::UnsupportedVersion`] for fragments in an unknown version
/// - [`SdfError::InvalidAttribute`] for an unusable `config`
pub fn resolve_includes(
    root: &mut CanonicalElement,
    fetcher: &dyn ModelFetch,
    config: &ResolverConfig,
) -> Result<()> {
    config.validate()?;
    let resolver = IncludeResolver { fetcher, config };
    resolver.expand_children(root, &[], 0)
}

struct IncludeResolver<'a> {
    fetcher: &'a dyn ModelFetch,
    config: &'a ResolverConfig,
}

impl IncludeResolver<'_> {
    /// Expand includes among the children of `parent`.
    ///
    /// `scope` is the path of the scope the children live in, relative to
    /// the document being expanded.
    fn expand_children(
        &self,
        parent: &mut CanonicalElement,
        scope: &[String],
        depth: usize,
    ) -> Result<()> {
        let children = mem::take(&mut parent.children);
        let mut taken: HashSet<String> = children
            .iter()
            .filter(|c| !matches!(c.kind, ElementKind::Include(_)))
            .map(|c| c.name.clone())
            .collect();

        let mut expanded = Vec::with_capacity(children.len());
        for mut child in children {
            if let ElementKind::Include(attrs) = &child.kind {
                let mut entity = self.expand_include(&child, attrs, depth + 1)?;
                if !scope.is_empty() {
                    prefix_scoped_references(&mut entity, scope);
                }
                if overrides_pose(&child, attrs) {
                    // Already expressed in the including document.
                    entity.relative_to = child.relative_to.clone();
                }
                if !taken.insert(entity.name.clone()) {
                    let label = if scope.is_empty() {
                        format!("world '{}'", parent.name)
                    } else {
                        format!("model '{}'", self.config.join(scope))
                    };
                    return Err(SdfError::name_collision(entity.name, label));
                }
                expanded.push(entity);
            } else {
                if child.kind.is_scope() && !matches!(child.kind, ElementKind::World) {
                    let mut inner = scope.to_vec();
                    inner.push(child.name.clone());
                    self.expand_children(&mut child, &inner, depth)?;
                } else {
                    self.expand_children(&mut child, scope, depth)?;
                }
                expanded.push(child);
            }
        }
        parent.children = expanded;
        Ok(())
    }

    /// Fetch, normalize and override the entity behind one include.
    fn expand_include(
        &self,
        include: &CanonicalElement,
        attrs: &IncludeAttrs,
        depth: usize,
    ) -> Result<CanonicalElement> {
        let uri = attrs.uri.as_str();
        if depth > self.config.max_include_depth {
            return Err(SdfError::unresolvable_include(
                uri,
                format!(
                    "includes nested deeper than {}",
                    self.config.max_include_depth
                ),
            ));
        }

        let fragment = self.fetcher.fetch(uri).map_err(|e| match e {
            SdfError::UnresolvableInclude { .. } => e,
            other => SdfError::unresolvable_include(uri, other.to_string()),
        })?;
        let version = FormatVersion::parse(&fragment.document.version)?;
        let entities = top_level_entities(&fragment.document);
        let [raw] = entities.as_slice() else {
            return Err(SdfError::unresolvable_include(
                uri,
                format!(
                    "expected exactly one model, actor or light, found {}",
                    entities.len()
                ),
            ));
        };
        let mut root = normalize_element(raw, version)?.ok_or_else(|| {
            SdfError::unresolvable_include(uri, format!("unsupported entity <{}>", raw.tag))
        })?;
        debug!(uri, entity = %root.name, version = %version, depth, "expanding include");

        if let Some(name) = &attrs.name {
            root.name = name.clone();
        }
        if let Some(is_static) = attrs.is_static {
            match &mut root.kind {
                ElementKind::Model(model) => model.is_static = is_static,
                other => warn!(uri, entity = other.tag(), "static override ignored"),
            }
        }

        self.qualify_references(&mut root);
        let root_name = root.name.clone();
        self.expand_children(&mut root, &[root_name], depth)?;

        if overrides_pose(include, attrs) {
            let target = include.pose_or_identity();
            let offset = match attrs.placement_frame.as_deref() {
                Some(frame) if frame != MODEL_FRAME => self.placement_offset(&root, frame)?,
                _ => Isometry3::identity(),
            };
            root.pose = Some(target * offset.inverse());
        }
        Ok(root)
    }

    /// Turn every local reference below the fragment root into a path from
    /// the fragment's document root.
    fn qualify_references(&self, root: &mut CanonicalElement) {
        for slot in [&mut root.relative_to, &mut root.attached_to] {
            if let Some(reference) = slot.take() {
                if !reference.is_world()
                    && !matches!(&reference, FrameRef::Local(name) if name == MODEL_FRAME)
                {
                    warn!(entity = %root.name, reference = %reference, "fragment root reference dropped");
                }
            }
        }

        let delimiter = self.config.scope_delimiter.as_str();
        let mut visit = |element: &mut CanonicalElement, enclosing: &[String]| {
            element.for_each_reference_mut(|reference| {
                if let FrameRef::Local(name) = reference {
                    if name == WORLD_FRAME {
                        return;
                    }
                    let mut path = enclosing.to_vec();
                    let mut segments = name.split(delimiter).peekable();
                    if segments.peek() == Some(&MODEL_FRAME) {
                        segments.next();
                    }
                    path.extend(segments.map(str::to_string));
                    *reference = FrameRef::Scoped(path);
                }
            });
        };
        let mut scope = vec![root.name.clone()];
        for child in &mut root.children {
            child.walk_scoped_mut(&mut scope, &mut visit);
        }
    }

    /// Pose of the placement frame in the fragment root's coordinates.
    fn placement_offset(&self, root: &CanonicalElement, frame: &str) -> Result<Isometry3<f64>> {
        let isolated = CanonicalElement::world(WORLD_FRAME, root.version, vec![root.clone()]);
        let graph = FrameGraph::from_canonical(&isolated, self.config)?;
        let placement = self.config.join(&[root.name.as_str(), frame]);
        if !graph.contains(&placement) {
            return Err(SdfError::unknown_pose_reference(root.name.clone(), frame));
        }
        graph.static_transform(&placement, &root.name)
    }
}

fn overrides_pose(include: &CanonicalElement, attrs: &IncludeAttrs) -> bool {
    include.pose.is_some() || attrs.placement_frame.is_some()
}

/// Prefix every scoped reference in a subtree with `scope`.
fn prefix_scoped_references(entity: &mut CanonicalElement, scope: &[String]) {
    entity.walk_scoped_mut(&mut Vec::new(), &mut |element, _| {
        element.for_each_reference_mut(|reference| {
            if let FrameRef::Scoped(path) = reference {
                let mut prefixed = scope.to_vec();
                prefixed.append(path);
                *path = prefixed;
            }
        });
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::fetch::{MemoryFetcher, NoFetch};
    use crate::normalize::normalize_document;
    use crate::parser::parse_sdf_str;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    const ARM: &str = r#"<sdf version="1.9">
        <model name="arm">
            <pose>0 0 5 0 0 0</pose>
            <link name="base"/>
            <link name="tip"><pose relative_to="base">0 0 1 0 0 0</pose></link>
            <frame name="mount" attached_to="base"><pose>1 0 0 0 0 0</pose></frame>
            <joint name="j" type="revolute"><parent>base</parent><child>tip</child></joint>
        </model>
    </sdf>"#;

    fn expand(world_xml: &str, fetcher: &dyn ModelFetch) -> Result<CanonicalElement> {
        let mut world = normalize_document(&parse_sdf_str(world_xml).unwrap(), None)?;
        resolve_includes(&mut world, fetcher, &ResolverConfig::default())?;
        Ok(world)
    }

    #[test]
    fn test_references_qualified() {
        let fetcher = MemoryFetcher::new().with_source("model://arm", ARM);
        let world = expand(
            r#"<sdf version="1.9"><world name="w">
                <include><uri>model://arm</uri><name>robot1</name></include>
            </world></sdf>"#,
            &fetcher,
        )
        .unwrap();
        let robot = &world.children[0];
        assert_eq!(robot.name, "robot1");
        let tip = &robot.children[1];
        assert_eq!(
            tip.relative_to,
            Some(FrameRef::Scoped(vec!["robot1".into(), "base".into()]))
        );
        let ElementKind::Joint(joint) = &robot.children[3].kind else {
            panic!("expected joint");
        };
        assert_eq!(
            joint.child,
            FrameRef::Scoped(vec!["robot1".into(), "tip".into()])
        );
    }

    #[test]
    fn test_nested_scope_prefix() {
        let fetcher = MemoryFetcher::new().with_source("model://arm", ARM);
        let world = expand(
            r#"<sdf version="1.9"><world name="w">
                <model name="cell">
                    <include><uri>model://arm</uri></include>
                </model>
            </world></sdf>"#,
            &fetcher,
        )
        .unwrap();
        let tip = &world.children[0].children[0].children[1];
        assert_eq!(
            tip.relative_to,
            Some(FrameRef::Scoped(vec![
                "cell".into(),
                "arm".into(),
                "base".into()
            ]))
        );
    }

    #[test]
    fn test_pose_override_replaces_root_pose() {
        let fetcher = MemoryFetcher::new().with_source("model://arm", ARM);
        let world = expand(
            r#"<sdf version="1.9"><world name="w">
                <include><uri>model://arm</uri><pose>1 2 3 0 0 0</pose></include>
            </world></sdf>"#,
            &fetcher,
        )
        .unwrap();
        let pose = world.children[0].pose.unwrap();
        assert_relative_eq!(pose.translation.vector, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_placement_frame_offset() {
        let fetcher = MemoryFetcher::new().with_source("model://arm", ARM);
        let world = expand(
            r#"<sdf version="1.9"><world name="w">
                <include>
                    <uri>model://arm</uri>
                    <placement_frame>mount</placement_frame>
                    <pose>0 0 0 0 0 0</pose>
                </include>
            </world></sdf>"#,
            &fetcher,
        )
        .unwrap();
        // mount sits at x=1 in the model, so the model moves to x=-1.
        let pose = world.children[0].pose.unwrap();
        assert_relative_eq!(pose.translation.vector, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_placement_frame() {
        let fetcher = MemoryFetcher::new().with_source("model://arm", ARM);
        let result = expand(
            r#"<sdf version="1.9"><world name="w">
                <include><uri>model://arm</uri><placement_frame>ghost</placement_frame></include>
            </world></sdf>"#,
            &fetcher,
        );
        assert!(matches!(result, Err(SdfError::UnknownPoseReference { .. })));
    }

    #[test]
    fn test_name_collision() {
        let fetcher = MemoryFetcher::new().with_source("model://arm", ARM);
        let result = expand(
            r#"<sdf version="1.9"><world name="w">
                <model name="arm"><link name="l"/></model>
                <include><uri>model://arm</uri></include>
            </world></sdf>"#,
            &fetcher,
        );
        assert!(matches!(result, Err(SdfError::NameCollision { ref name, .. }) if name == "arm"));

        let result = expand(
            r#"<sdf version="1.9"><world name="w">
                <include><uri>model://arm</uri></include>
                <include><uri>model://arm</uri></include>
            </world></sdf>"#,
            &fetcher,
        );
        assert!(matches!(result, Err(SdfError::NameCollision { .. })));
    }

    #[test]
    fn test_unresolvable() {
        let result = expand(
            r#"<sdf version="1.9"><world name="w">
                <include><uri>model://missing</uri></include>
            </world></sdf>"#,
            &NoFetch,
        );
        assert!(matches!(
            result,
            Err(SdfError::UnresolvableInclude { ref uri, .. }) if uri == "model://missing"
        ));
    }

    #[test]
    fn test_wrong_entity_count() {
        let fetcher = MemoryFetcher::new().with_source(
            "model://pair",
            r#"<sdf version="1.9"><model name="a"><link name="l"/></model><model name="b"><link name="l"/></model></sdf>"#,
        );
        let result = expand(
            r#"<sdf version="1.9"><world name="w"><include><uri>model://pair</uri></include></world></sdf>"#,
            &fetcher,
        );
        assert!(matches!(result, Err(SdfError::UnresolvableInclude { .. })));
    }

    #[test]
    fn test_unsupported_fragment_version() {
        let fetcher = MemoryFetcher::new().with_source(
            "model://old",
            r#"<sdf version="0.9"><model name="a"><link name="l"/></model></sdf>"#,
        );
        let result = expand(
            r#"<sdf version="1.9"><world name="w"><include><uri>model://old</uri></include></world></sdf>"#,
            &fetcher,
        );
        assert!(matches!(result, Err(SdfError::UnsupportedVersion(_))));
    }

    #[test]
    fn test_recursive_include_depth() {
        let fetcher = MemoryFetcher::new().with_source(
            "model://loop",
            r#"<sdf version="1.9"><model name="a">
                <link name="l"/>
                <include><uri>model://loop</uri><name>inner</name></include>
            </model></sdf>"#,
        );
        let mut world = normalize_document(
            &parse_sdf_str(
                r#"<sdf version="1.9"><world name="w"><include><uri>model://loop</uri></include></world></sdf>"#,
            )
            .unwrap(),
            None,
        )
        .unwrap();
        let config = ResolverConfig::default().with_max_include_depth(3);
        let result = resolve_includes(&mut world, &fetcher, &config);
        assert!(matches!(result, Err(SdfError::UnresolvableInclude { .. })));
    }

    #[test]
    fn test_nested_fragment_includes() {
        let fetcher = MemoryFetcher::new()
            .with_source("model://arm", ARM)
            .with_source(
                "model://cell",
                r#"<sdf version="1.9"><model name="cell">
                    <link name="table"/>
                    <include><uri>model://arm</uri><pose relative_to="table">0 0 1 0 0 0</pose></include>
                </model></sdf>"#,
            );
        let world = expand(
            r#"<sdf version="1.9"><world name="w"><include><uri>model://cell</uri><name>c1</name></include></world></sdf>"#,
            &fetcher,
        )
        .unwrap();
        let arm = &world.children[0].children[1];
        assert_eq!(arm.name, "arm");
        assert_eq!(
            arm.relative_to,
            Some(FrameRef::Scoped(vec!["c1".into(), "table".into()]))
        );
        let tip = &arm.children[1];
        assert_eq!(
            tip.relative_to,
            Some(FrameRef::Scoped(vec!["c1".into(), "arm".into(), "base".into()]))
        );
    }
}
