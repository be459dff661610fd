//! Version normalizer: raw element tree to canonical element tree.
//!
//! Collapses renamed fields across format versions (legacy names are still
//! accepted and logged as deprecated), drops attributes a version does not
//! define, and converts numeric vectors to one representation.

use nalgebra::Isometry3;
use tracing::{debug, warn};

use crate::error::{Result, SdfError};
use crate::orientation::{RotationFormat, parse_floats, parse_vector3, pose_from_values};
use crate::parser::{RawDocument, RawElement};
use crate::types::{
    CanonicalElement, ElementKind, FrameRef, IncludeAttrs, JointAttrs, JointAxis, JointType,
    LightKind, MODEL_FRAME, ModelAttrs, SensorKind, WORLD_FRAME,
};
use crate::version::FormatVersion;

/// Tags of entities a document or fragment may hold at top level.
const ENTITY_TAGS: &[&str] = &["model", "actor", "light"];

/// Normalize a whole document into a world element.
///
/// If the document holds `<world>` elements, the one named `world_name` (or
/// the first) is used. Otherwise the top-level entities are wrapped in an
/// implicit world.
pub fn normalize_document(
    document: &RawDocument,
    world_name: Option<&str>,
) -> Result<CanonicalElement> {
    let version = FormatVersion::parse(&document.version)?;
    let worlds: Vec<&RawElement> = document.root.children_named("world").collect();

    if worlds.is_empty() {
        debug!(version = %version, "document has no <world>, using implicit world");
        let children = document
            .root
            .children
            .iter()
            .filter(|c| ENTITY_TAGS.contains(&c.tag.as_str()))
            .map(|c| normalize_element(c, version))
            .filter_map(Result::transpose)
            .collect::<Result<Vec<_>>>()?;
        return Ok(CanonicalElement::world(WORLD_FRAME, version, children));
    }

    let world = match world_name {
        Some(name) => worlds
            .iter()
            .find(|w| w.attr("name") == Some(name))
            .copied()
            .ok_or_else(|| SdfError::missing_element("world", format!("world named '{name}'")))?,
        None => {
            if worlds.len() > 1 {
                debug!(count = worlds.len(), "document has several worlds, using the first");
            }
            worlds[0]
        }
    };
    normalize_element(world, version)?
        .ok_or_else(|| SdfError::missing_element("world", "document"))
}

/// Top-level entities (model, actor, light) of a fragment document.
pub fn top_level_entities(document: &RawDocument) -> Vec<&RawElement> {
    document
        .root
        .children
        .iter()
        .filter(|c| ENTITY_TAGS.contains(&c.tag.as_str()))
        .collect()
}

/// Normalize one raw element.
///
/// Returns `Ok(None)` for elements that do not take part in frame resolution
/// (geometry, materials, plugins, ...).
pub fn normalize_element(
    raw: &RawElement,
    version: FormatVersion,
) -> Result<Option<CanonicalElement>> {
    let element = match raw.tag.as_str() {
        "world" => {
            let name = raw.attr("name").unwrap_or("default");
            let mut world = CanonicalElement::new(ElementKind::World, name, version);
            world.children = normalize_children(raw, version)?;
            world
        }
        "model" => normalize_model(raw, version)?,
        "actor" => {
            let mut actor =
                CanonicalElement::new(ElementKind::Actor, required_name(raw)?, version);
            apply_pose(&mut actor, raw, version)?;
            actor.children = normalize_children(raw, version)?;
            actor
        }
        "link" => {
            let mut link = CanonicalElement::new(ElementKind::Link, required_name(raw)?, version);
            apply_pose(&mut link, raw, version)?;
            let mut children = normalize_children(raw, version)?;
            children.retain(|child| {
                let nested_frame = child.kind == ElementKind::Frame;
                if nested_frame {
                    warn!(link = %link.name, frame = %child.name, "frame inside a link is not supported, ignored");
                }
                !nested_frame
            });
            link.children = children;
            link
        }
        "joint" => normalize_joint(raw, version)?,
        "frame" => normalize_frame(raw, version)?,
        "light" => {
            let kind = LightKind::from_name(raw.attr("type").unwrap_or("point"))?;
            let mut light =
                CanonicalElement::new(ElementKind::Light(kind), required_name(raw)?, version);
            apply_pose(&mut light, raw, version)?;
            light
        }
        "sensor" => normalize_sensor(raw, version)?,
        "include" => normalize_include(raw, version)?,
        _ => return Ok(None),
    };
    Ok(Some(element))
}

fn normalize_children(raw: &RawElement, version: FormatVersion) -> Result<Vec<CanonicalElement>> {
    let mut children = Vec::new();
    for child in &raw.children {
        if let Some(element) = normalize_element(child, version)? {
            children.push(element);
        }
    }
    Ok(children)
}

fn required_name(raw: &RawElement) -> Result<String> {
    raw.attr("name")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SdfError::missing_attribute("name", raw.tag.clone()))
}

fn parse_bool(text: &str, attribute: &'static str, element: &str) -> Result<bool> {
    match text.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(SdfError::invalid_attribute(
            attribute,
            element,
            format!("'{other}' is not a boolean"),
        )),
    }
}

/// Read an optional `<pose>` child into the element's pose and `relative_to`.
fn apply_pose(element: &mut CanonicalElement, raw: &RawElement, version: FormatVersion) -> Result<()> {
    if let Some(pose) = raw.child("pose") {
        let (transform, relative_to) = normalize_pose(pose, version, &element.name)?;
        element.pose = Some(transform);
        element.relative_to = relative_to;
    }
    Ok(())
}

/// Normalize a `<pose>` element into a transform and its reference frame.
pub fn normalize_pose(
    pose: &RawElement,
    version: FormatVersion,
    owner: &str,
) -> Result<(Isometry3<f64>, Option<FrameRef>)> {
    let degrees = match pose.attr("degrees") {
        Some(value) => parse_bool(value, "degrees", owner)?,
        None => false,
    };
    let format = match pose.attr("rotation_format") {
        Some(value) => RotationFormat::from_name(value)?,
        None => RotationFormat::EulerRpy,
    };
    let values = parse_floats(&pose.text, "pose", owner)?;
    let transform = pose_from_values(&values, degrees, format, owner)?;

    let relative_to = if version >= FormatVersion::SCOPED {
        if pose.attr("frame").is_some() {
            warn!(element = owner, version = %version, "pose/@frame is not defined in this version, ignored");
        }
        FrameRef::from_attribute(pose.attr("relative_to"))
    } else {
        if pose.attr("relative_to").is_some() {
            warn!(element = owner, version = %version, "pose/@relative_to is not defined in this version, ignored");
        }
        let legacy = FrameRef::from_attribute(pose.attr("frame"));
        if legacy.is_some() {
            warn!(element = owner, "pose/@frame is deprecated, treated as relative_to");
        }
        legacy
    };
    Ok((transform, relative_to))
}

fn normalize_model(raw: &RawElement, version: FormatVersion) -> Result<CanonicalElement> {
    let name = required_name(raw)?;
    let is_static = match raw.child_text("static") {
        Some(text) => parse_bool(text, "static", &name)?,
        None => false,
    };
    let canonical_link = if version >= FormatVersion::PLACEMENT {
        raw.attr("canonical_link")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    } else {
        if raw.attr("canonical_link").is_some() {
            warn!(model = %name, version = %version, "canonical_link is not defined in this version, ignored");
        }
        None
    };
    if raw.attr("placement_frame").is_some() {
        warn!(model = %name, "model/@placement_frame is only honored on <include>, ignored");
    }

    let mut model = CanonicalElement::new(
        ElementKind::Model(ModelAttrs {
            is_static,
            canonical_link,
        }),
        name,
        version,
    );
    apply_pose(&mut model, raw, version)?;
    model.children = normalize_children(raw, version)?;
    Ok(model)
}

fn normalize_frame(raw: &RawElement, version: FormatVersion) -> Result<CanonicalElement> {
    let mut frame = CanonicalElement::new(ElementKind::Frame, required_name(raw)?, version);
    apply_pose(&mut frame, raw, version)?;
    if version >= FormatVersion::SCOPED {
        frame.attached_to = FrameRef::from_attribute(raw.attr("attached_to"));
    } else if raw.attr("attached_to").is_some() {
        warn!(frame = %frame.name, version = %version, "frame/@attached_to is not defined in this version, ignored");
    }
    Ok(frame)
}

fn normalize_joint(raw: &RawElement, version: FormatVersion) -> Result<CanonicalElement> {
    let name = required_name(raw)?;
    let joint_type = JointType::from_name(
        raw.attr("type")
            .ok_or_else(|| SdfError::missing_attribute("type", format!("joint '{name}'")))?,
    )?;
    let parent = raw
        .child_text("parent")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SdfError::missing_element("parent", format!("joint '{name}'")))?;
    let child = raw
        .child_text("child")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SdfError::missing_element("child", format!("joint '{name}'")))?;

    let mut attrs = JointAttrs::new(joint_type, parent, child);
    if let Some(axis) = raw.child("axis") {
        attrs.axis = normalize_axis(axis, version, &name, JointAxis::default())?;
    }
    if let Some(axis2) = raw.child("axis2") {
        attrs.axis2 = normalize_axis(axis2, version, &name, attrs.axis2.clone())?;
    }
    if let Some(pitch) = raw.child_text("screw_thread_pitch") {
        attrs.thread_pitch = parse_scalar(pitch, "screw_thread_pitch", &name)?;
    } else if let Some(pitch) = raw.child_text("thread_pitch") {
        warn!(joint = %name, "thread_pitch is deprecated, use screw_thread_pitch");
        // Legacy pitch is radians per meter with the opposite sign.
        let legacy = parse_scalar(pitch, "thread_pitch", &name)?;
        if legacy == 0.0 {
            return Err(SdfError::invalid_attribute(
                "thread_pitch",
                name,
                "must be non-zero",
            ));
        }
        attrs.thread_pitch = -std::f64::consts::TAU / legacy;
    }

    let mut joint = CanonicalElement::new(ElementKind::Joint(attrs), name, version);
    apply_pose(&mut joint, raw, version)?;
    Ok(joint)
}

fn parse_scalar(text: &str, attribute: &'static str, element: &str) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|_| {
        SdfError::invalid_attribute(attribute, element, format!("'{text}' is not a number"))
    })
}

fn normalize_axis(
    raw: &RawElement,
    version: FormatVersion,
    joint: &str,
    default: JointAxis,
) -> Result<JointAxis> {
    let mut axis = default;
    if let Some(xyz) = raw.child("xyz") {
        axis.xyz = parse_vector3(&xyz.text, "xyz", joint)?;
        if version >= FormatVersion::SCOPED {
            axis.expressed_in = FrameRef::from_attribute(xyz.attr("expressed_in"));
        }
    }
    if version < FormatVersion::SCOPED {
        if let Some(flag) = raw.child_text("use_parent_model_frame") {
            if parse_bool(flag, "use_parent_model_frame", joint)? {
                warn!(joint, "use_parent_model_frame is deprecated, treated as expressed_in=__model__");
                axis.expressed_in = Some(FrameRef::local(MODEL_FRAME));
            }
        }
    } else if raw.child("use_parent_model_frame").is_some() {
        warn!(joint, version = %version, "use_parent_model_frame is not defined in this version, ignored");
    }
    Ok(axis)
}

fn normalize_sensor(raw: &RawElement, version: FormatVersion) -> Result<CanonicalElement> {
    let name = required_name(raw)?;
    let type_name = raw
        .attr("type")
        .ok_or_else(|| SdfError::missing_attribute("type", format!("sensor '{name}'")))?;
    let (kind, deprecated) = SensorKind::from_type_name(type_name);
    if deprecated {
        warn!(sensor = %name, type_name, canonical = ?kind, "deprecated sensor type");
    }
    let mut sensor = CanonicalElement::new(ElementKind::Sensor(kind), name, version);
    apply_pose(&mut sensor, raw, version)?;
    Ok(sensor)
}

fn normalize_include(raw: &RawElement, version: FormatVersion) -> Result<CanonicalElement> {
    let uri = raw
        .child_text("uri")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SdfError::missing_element("uri", "include"))?;

    let mut attrs = IncludeAttrs::new(uri);
    attrs.name = raw
        .child_text("name")
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if let Some(text) = raw.child_text("static") {
        attrs.is_static = Some(parse_bool(text, "static", uri)?);
    }
    if let Some(frame) = raw.child_text("placement_frame").filter(|s| !s.is_empty()) {
        if version >= FormatVersion::PLACEMENT {
            attrs.placement_frame = Some(frame.to_string());
        } else {
            warn!(uri, version = %version, "placement_frame is not defined in this version, ignored");
        }
    }

    let name = attrs.name.clone().unwrap_or_default();
    let mut include = CanonicalElement::new(ElementKind::Include(attrs), name, version);
    apply_pose(&mut include, raw, version)?;
    Ok(include)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::parser::parse_sdf_str;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn normalize_str(xml: &str) -> Result<CanonicalElement> {
        normalize_document(&parse_sdf_str(xml).unwrap(), None)
    }

    #[test]
    fn test_unsupported_version() {
        let result = normalize_str(r#"<sdf version="3.0"><world name="w"/></sdf>"#);
        assert!(matches!(result, Err(SdfError::UnsupportedVersion(v)) if v == "3.0"));
    }

    #[test]
    fn test_implicit_world_for_model_document() {
        let world = normalize_str(
            r#"<sdf version="1.8"><model name="m"><link name="l"/></model></sdf>"#,
        )
        .unwrap();
        assert_eq!(world.kind, ElementKind::World);
        assert_eq!(world.children.len(), 1);
        assert_eq!(world.children[0].name, "m");
        assert_eq!(world.children[0].children[0].kind, ElementKind::Link);
    }

    #[test]
    fn test_world_selection() {
        let xml = r#"<sdf version="1.9">
            <world name="a"><model name="ma"><link name="l"/></model></world>
            <world name="b"><model name="mb"><link name="l"/></model></world>
        </sdf>"#;
        let doc = parse_sdf_str(xml).unwrap();
        let first = normalize_document(&doc, None).unwrap();
        assert_eq!(first.name, "a");
        let second = normalize_document(&doc, Some("b")).unwrap();
        assert_eq!(second.children[0].name, "mb");
        assert!(normalize_document(&doc, Some("c")).is_err());
    }

    #[test]
    fn test_legacy_pose_frame_becomes_relative_to() {
        let world = normalize_str(
            r#"<sdf version="1.6"><model name="m">
                <link name="a"/>
                <link name="b"><pose frame="a">1 0 0 0 0 0</pose></link>
            </model></sdf>"#,
        )
        .unwrap();
        let b = &world.children[0].children[1];
        assert_eq!(b.relative_to, Some(FrameRef::local("a")));
    }

    #[test]
    fn test_modern_pose_ignores_frame_attribute() {
        let world = normalize_str(
            r#"<sdf version="1.7"><model name="m">
                <link name="a"/>
                <link name="b"><pose frame="a">1 0 0 0 0 0</pose></link>
            </model></sdf>"#,
        )
        .unwrap();
        assert_eq!(world.children[0].children[1].relative_to, None);
    }

    #[test]
    fn test_legacy_frame_drops_attached_to() {
        let world = normalize_str(
            r#"<sdf version="1.5"><model name="m">
                <link name="a"/>
                <frame name="f" attached_to="a"/>
            </model></sdf>"#,
        )
        .unwrap();
        assert_eq!(world.children[0].children[1].attached_to, None);
    }

    #[test]
    fn test_sensor_alias_collapses() {
        let world = normalize_str(
            r#"<sdf version="1.6"><model name="m">
                <link name="a">
                    <sensor name="old" type="ray"/>
                    <sensor name="new" type="lidar"/>
                </link>
            </model></sdf>"#,
        )
        .unwrap();
        let link = &world.children[0].children[0];
        assert_eq!(link.children[0].kind, link.children[1].kind);
        assert_eq!(link.children[0].kind, ElementKind::Sensor(SensorKind::Lidar));
    }

    #[test]
    fn test_joint_defaults_and_axis() {
        let world = normalize_str(
            r#"<sdf version="1.9"><model name="m">
                <link name="a"/><link name="b"/>
                <joint name="j" type="revolute">
                    <parent>a</parent><child>b</child>
                    <axis><xyz expressed_in="__model__">1 0 0</xyz></axis>
                </joint>
                <joint name="k" type="prismatic"><parent>a</parent><child>b</child></joint>
            </model></sdf>"#,
        )
        .unwrap();
        let model = &world.children[0];
        let ElementKind::Joint(j) = &model.children[2].kind else {
            panic!("expected joint");
        };
        assert_eq!(j.joint_type, JointType::Revolute);
        assert_eq!(j.axis.xyz, Vector3::x());
        assert_eq!(j.axis.expressed_in, Some(FrameRef::local("__model__")));

        let ElementKind::Joint(k) = &model.children[3].kind else {
            panic!("expected joint");
        };
        assert_eq!(k.axis.xyz, Vector3::z());
        assert_eq!(k.axis.expressed_in, None);
    }

    #[test]
    fn test_legacy_use_parent_model_frame() {
        let world = normalize_str(
            r#"<sdf version="1.4"><model name="m">
                <link name="a"/><link name="b"/>
                <joint name="j" type="revolute">
                    <parent>a</parent><child>b</child>
                    <axis><xyz>0 1 0</xyz><use_parent_model_frame>true</use_parent_model_frame></axis>
                </joint>
            </model></sdf>"#,
        )
        .unwrap();
        let ElementKind::Joint(j) = &world.children[0].children[2].kind else {
            panic!("expected joint");
        };
        assert_eq!(j.axis.expressed_in, Some(FrameRef::local(MODEL_FRAME)));
    }

    #[test]
    fn test_joint_missing_child() {
        let result = normalize_str(
            r#"<sdf version="1.9"><model name="m">
                <link name="a"/>
                <joint name="j" type="fixed"><parent>a</parent></joint>
            </model></sdf>"#,
        );
        assert!(matches!(
            result,
            Err(SdfError::MissingElement { element: "child", .. })
        ));
    }

    #[test]
    fn test_include_overrides() {
        let world = normalize_str(
            r#"<sdf version="1.9"><world name="w">
                <include>
                    <uri>model://arm</uri>
                    <name>robot1</name>
                    <static>true</static>
                    <placement_frame>base</placement_frame>
                    <pose degrees="true">1 0 0 0 0 90</pose>
                </include>
            </world></sdf>"#,
        )
        .unwrap();
        let include = &world.children[0];
        let ElementKind::Include(attrs) = &include.kind else {
            panic!("expected include");
        };
        assert_eq!(attrs.uri, "model://arm");
        assert_eq!(attrs.name.as_deref(), Some("robot1"));
        assert_eq!(attrs.is_static, Some(true));
        assert_eq!(attrs.placement_frame.as_deref(), Some("base"));
        let pose = include.pose.unwrap();
        assert_relative_eq!(pose.rotation * Vector3::x(), Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_placement_frame_needs_1_8() {
        let world = normalize_str(
            r#"<sdf version="1.7"><world name="w">
                <include><uri>model://arm</uri><placement_frame>base</placement_frame></include>
            </world></sdf>"#,
        )
        .unwrap();
        let ElementKind::Include(attrs) = &world.children[0].kind else {
            panic!("expected include");
        };
        assert!(attrs.placement_frame.is_none());
    }

    #[test]
    fn test_unrelated_elements_skipped() {
        let world = normalize_str(
            r#"<sdf version="1.9"><model name="m">
                <link name="a"><visual name="v"><geometry><box><size>1 1 1</size></box></geometry></visual></link>
                <plugin name="p" filename="x.so"/>
            </model></sdf>"#,
        )
        .unwrap();
        let model = &world.children[0];
        assert_eq!(model.children.len(), 1);
        assert!(model.children[0].children.is_empty());
    }

    #[test]
    fn test_missing_name() {
        let result = normalize_str(r#"<sdf version="1.9"><model><link name="a"/></model></sdf>"#);
        assert!(matches!(
            result,
            Err(SdfError::MissingAttribute { attribute: "name", .. })
        ));
    }

    fn screw_pitch(xml: &str) -> Result<f64> {
        let world = normalize_str(xml)?;
        match &world.children[0].children[2].kind {
            ElementKind::Joint(joint) => Ok(joint.thread_pitch),
            other => panic!("expected joint, got {}", other.tag()),
        }
    }

    #[test]
    fn test_legacy_thread_pitch_converted() {
        let pitch = screw_pitch(
            r#"<sdf version="1.6"><model name="m">
                <link name="a"/><link name="b"/>
                <joint name="s" type="screw">
                    <parent>a</parent><child>b</child>
                    <thread_pitch>3.14159265358979</thread_pitch>
                </joint>
            </model></sdf>"#,
        )
        .unwrap();
        assert_relative_eq!(pitch, -2.0, epsilon = 1e-9);

        let pitch = screw_pitch(
            r#"<sdf version="1.10"><model name="m">
                <link name="a"/><link name="b"/>
                <joint name="s" type="screw">
                    <parent>a</parent><child>b</child>
                    <screw_thread_pitch>0.25</screw_thread_pitch>
                    <thread_pitch>100</thread_pitch>
                </joint>
            </model></sdf>"#,
        )
        .unwrap();
        assert_relative_eq!(pitch, 0.25);
    }

    #[test]
    fn test_zero_legacy_thread_pitch() {
        let result = screw_pitch(
            r#"<sdf version="1.6"><model name="m">
                <link name="a"/><link name="b"/>
                <joint name="s" type="screw">
                    <parent>a</parent><child>b</child>
                    <thread_pitch>0</thread_pitch>
                </joint>
            </model></sdf>"#,
        );
        assert!(matches!(
            result,
            Err(SdfError::InvalidAttribute { attribute: "thread_pitch", .. })
        ));
    }

    #[test]
    fn test_frame_inside_link_dropped() {
        let world = normalize_str(
            r#"<sdf version="1.5"><model name="m">
                <link name="l">
                    <frame name="f"><pose>1 0 0 0 0 0</pose></frame>
                    <sensor name="cam" type="camera"/>
                </link>
            </model></sdf>"#,
        )
        .unwrap();
        let link = &world.children[0].children[0];
        assert_eq!(link.children.len(), 1);
        assert_eq!(link.children[0].name, "cam");
    }
}
