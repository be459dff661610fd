//! Transform composition over the query chain, optionally batched.
//!
//! Batch shapes follow numpy conventions: row-major layout, an empty shape
//! is a single instance, and dimensions of size one broadcast.

use std::collections::HashMap;
use std::f64::consts::TAU;

use nalgebra::{Isometry3, Point3, Translation3, Unit, UnitQuaternion, Vector3};

use crate::error::{Result, SdfError};
use crate::frame_table::FrameId;
use crate::pose::{EdgeTransform, JointMotion, PoseEdge};
use crate::types::JointType;

// ============================================================================
// Articulation values
// ============================================================================

/// Articulation values for a transform query.
///
/// Each joint degree of freedom holds either one value, broadcast over the
/// batch, or exactly one value per batch element. Joints without values are
/// at zero.
///
/// ```
/// use sim_sdf::JointValues;
///
/// let values = JointValues::batched([4])
///     .with("arm::shoulder", 0.5)
///     .with_batch("arm::elbow", vec![0.0, 0.1, 0.2, 0.3]);
/// assert_eq!(values.batch_size(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointValues {
    shape: Vec<usize>,
    values: HashMap<(String, usize), Vec<f64>>,
}

impl JointValues {
    /// Unbatched values, all joints at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Values for a batch of the given shape.
    pub fn batched(shape: impl Into<Vec<usize>>) -> Self {
        Self {
            shape: shape.into(),
            values: HashMap::new(),
        }
    }

    /// Set the first degree of freedom of `joint` for the whole batch.
    #[must_use]
    pub fn with(mut self, joint: impl Into<String>, value: f64) -> Self {
        self.set(joint, 0, vec![value]);
        self
    }

    /// Set the first degree of freedom of `joint` per batch element.
    #[must_use]
    pub fn with_batch(mut self, joint: impl Into<String>, values: Vec<f64>) -> Self {
        self.set(joint, 0, values);
        self
    }

    /// Set degree of freedom `dof` of `joint`.
    #[must_use]
    pub fn with_dof(mut self, joint: impl Into<String>, dof: usize, values: Vec<f64>) -> Self {
        self.set(joint, dof, values);
        self
    }

    /// Set degree of freedom `dof` of `joint`.
    pub fn set(&mut self, joint: impl Into<String>, dof: usize, values: Vec<f64>) {
        self.values.insert((joint.into(), dof), values);
    }

    /// Values of one degree of freedom, if set.
    pub fn get(&self, joint: &str, dof: usize) -> Option<&[f64]> {
        self.values
            .get(&(joint.to_string(), dof))
            .map(Vec::as_slice)
    }

    /// Batch shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of batch elements.
    pub fn batch_size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether no values are set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check the values against the graph's joints and lay them out by index.
    pub(crate) fn resolve(
        &self,
        joints: &[JointMotion],
        index: &HashMap<String, usize>,
    ) -> Result<ResolvedValues> {
        let batch = self.batch_size();
        let mut per_joint: Vec<Vec<Vec<f64>>> = joints
            .iter()
            .map(|joint| vec![Vec::new(); joint.joint_type.dof()])
            .collect();

        for ((name, dof), values) in &self.values {
            let &joint = index
                .get(name)
                .ok_or_else(|| SdfError::UnknownJoint(name.clone()))?;
            let dofs = joints[joint].joint_type.dof();
            if *dof >= dofs {
                return Err(SdfError::invalid_joint(
                    name.clone(),
                    format!("has {dofs} degrees of freedom, got a value for index {dof}"),
                ));
            }
            if values.len() != 1 && values.len() != batch {
                return Err(SdfError::BatchShapeMismatch(format!(
                    "joint '{name}' has {} values for batch shape {:?}",
                    values.len(),
                    self.shape
                )));
            }
            per_joint[joint][*dof] = values.clone();
        }

        Ok(ResolvedValues {
            shape: self.shape.clone(),
            per_joint,
        })
    }
}

/// Values laid out by joint index and degree of freedom.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedValues {
    shape: Vec<usize>,
    per_joint: Vec<Vec<Vec<f64>>>,
}

impl ResolvedValues {
    fn batch_size(&self) -> usize {
        self.shape.iter().product()
    }

    fn joint(&self, joint: usize, element: usize) -> [f64; 3] {
        let mut q = [0.0; 3];
        for (slot, values) in q.iter_mut().zip(&self.per_joint[joint]) {
            *slot = match values.len() {
                0 => 0.0,
                1 => values[0],
                _ => values[element],
            };
        }
        q
    }
}

// ============================================================================
// Joint articulation
// ============================================================================

fn rotation(axis: &Vector3<f64>, angle: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Unit::new_normalize(*axis), angle)
}

/// Transform from a joint's frame to its parent-side frame for values `q`.
///
/// Identity when every value is zero.
pub fn joint_motion(motion: &JointMotion, q: [f64; 3]) -> Isometry3<f64> {
    match motion.joint_type {
        JointType::Fixed | JointType::Gearbox => Isometry3::identity(),
        JointType::Revolute | JointType::Continuous => {
            Isometry3::from_parts(Translation3::identity(), rotation(&motion.axis, q[0]))
        }
        JointType::Prismatic => Isometry3::from_parts(
            Translation3::from(motion.axis * q[0]),
            UnitQuaternion::identity(),
        ),
        JointType::Screw => Isometry3::from_parts(
            Translation3::from(motion.axis * (q[0] / TAU * motion.thread_pitch)),
            rotation(&motion.axis, q[0]),
        ),
        JointType::Universal | JointType::Revolute2 => Isometry3::from_parts(
            Translation3::identity(),
            rotation(&motion.axis, q[0]) * rotation(&motion.axis2, q[1]),
        ),
        JointType::Ball => Isometry3::from_parts(
            Translation3::identity(),
            rotation(&Vector3::x(), q[0])
                * rotation(&Vector3::y(), q[1])
                * rotation(&Vector3::z(), q[2]),
        ),
    }
}

// ============================================================================
// Chain composition
// ============================================================================

/// Frames from `frame` up to the root of its chain.
fn chain(edges: &[Option<PoseEdge>], frame: FrameId) -> Vec<FrameId> {
    let mut out = vec![frame];
    let mut current = frame;
    while let Some(edge) = &edges[current.index()] {
        if out.len() > edges.len() {
            break;
        }
        current = edge.reference;
        out.push(current);
    }
    out
}

/// Pose of `source` in `target` coordinates for every batch element.
///
/// Returns `None` if the two frames share no ancestor.
pub(crate) fn compose(
    edges: &[Option<PoseEdge>],
    joints: &[JointMotion],
    source: FrameId,
    target: FrameId,
    values: &ResolvedValues,
) -> Option<BatchTransform> {
    let source_chain = chain(edges, source);
    let target_chain = chain(edges, target);
    let target_depth: HashMap<FrameId, usize> = target_chain
        .iter()
        .enumerate()
        .map(|(depth, id)| (*id, depth))
        .collect();
    let (source_len, target_len) = source_chain
        .iter()
        .enumerate()
        .find_map(|(depth, id)| target_depth.get(id).map(|t| (depth, *t)))?;

    let branches = [&source_chain[..source_len], &target_chain[..target_len]];
    let articulated = branches.iter().any(|branch| {
        branch.iter().any(|id| {
            matches!(
                edges[id.index()].map(|e| e.transform),
                Some(EdgeTransform::Joint { .. })
            )
        })
    });

    let branch_transform = |branch: &[FrameId], element: usize| {
        branch.iter().fold(Isometry3::identity(), |acc, id| {
            match edges[id.index()].map(|e| e.transform) {
                Some(EdgeTransform::Fixed(t)) => t * acc,
                Some(EdgeTransform::Joint { index }) => {
                    joint_motion(&joints[index], values.joint(index, element)) * acc
                }
                None => acc,
            }
        })
    };
    let pose_at = |element: usize| {
        let from_source = branch_transform(branches[0], element);
        let from_target = branch_transform(branches[1], element);
        from_target.inv_mul(&from_source)
    };

    let batch = values.batch_size();
    let transforms = if articulated {
        (0..batch).map(pose_at).collect()
    } else {
        vec![pose_at(0); batch]
    };
    Some(BatchTransform {
        shape: values.shape.clone(),
        transforms,
    })
}

// ============================================================================
// Batched result
// ============================================================================

/// Transforms for every element of a batch, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTransform {
    shape: Vec<usize>,
    transforms: Vec<Isometry3<f64>>,
}

impl BatchTransform {
    /// Wrap transforms laid out row-major over `shape`.
    ///
    /// # Errors
    ///
    /// Returns [`SdfError::BatchShapeMismatch`] if the count does not match.
    pub fn new(shape: Vec<usize>, transforms: Vec<Isometry3<f64>>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if transforms.len() != expected {
            return Err(SdfError::BatchShapeMismatch(format!(
                "{} transforms for batch shape {shape:?}",
                transforms.len()
            )));
        }
        Ok(Self { shape, transforms })
    }

    /// A single unbatched transform.
    pub fn single_transform(transform: Isometry3<f64>) -> Self {
        Self {
            shape: Vec::new(),
            transforms: vec![transform],
        }
    }

    /// Batch shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of transforms.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// The transform of an unbatched query (the first element otherwise).
    pub fn single(&self) -> Option<&Isometry3<f64>> {
        self.transforms.first()
    }

    /// Transform at a flat batch index.
    pub fn get(&self, index: usize) -> Option<&Isometry3<f64>> {
        self.transforms.get(index)
    }

    /// Transform at a multi-dimensional batch index.
    pub fn get_at(&self, index: &[usize]) -> Option<&Isometry3<f64>> {
        if index.len() != self.shape.len() || index.iter().zip(&self.shape).any(|(i, n)| i >= n) {
            return None;
        }
        self.transforms.get(ravel(index, &self.shape))
    }

    /// Iterate transforms in row-major order.
    pub fn iter(&self) -> std::slice::Iter<'_, Isometry3<f64>> {
        self.transforms.iter()
    }

    /// All transforms in row-major order.
    pub fn as_slice(&self) -> &[Isometry3<f64>] {
        &self.transforms
    }

    /// Element-wise inverse.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            transforms: self.transforms.iter().map(Isometry3::inverse).collect(),
        }
    }

    /// Translations as a row-major array whose `axis` dimension holds xyz.
    ///
    /// The output has one more dimension than the batch; `axis` may be
    /// negative and counts from the end of the output shape.
    ///
    /// # Errors
    ///
    /// Returns [`SdfError::AmbiguousAxis`] if `axis` is out of range.
    pub fn translations(&self, axis: isize) -> Result<(Vec<f64>, Vec<usize>)> {
        let n = self.shape.len();
        let position = normalize_axis(axis, n + 1).ok_or_else(|| SdfError::AmbiguousAxis {
            axis,
            shape: self.shape.clone(),
        })?;
        let mut out_shape = self.shape.clone();
        out_shape.insert(position, 3);

        let mut out = vec![0.0; self.transforms.len() * 3];
        for (flat, transform) in self.transforms.iter().enumerate() {
            let mut index = unravel(flat, &self.shape);
            index.insert(position, 0);
            for c in 0..3 {
                index[position] = c;
                out[ravel(&index, &out_shape)] = transform.translation.vector[c];
            }
        }
        Ok((out, out_shape))
    }

    /// Apply the transforms to a row-major point array.
    ///
    /// `shape` is the shape of `data` and `axis` the dimension holding the
    /// xyz components. The remaining dimensions broadcast against the batch
    /// shape. The output keeps the component dimension at the same position
    /// counted from the end.
    ///
    /// # Errors
    ///
    /// - [`SdfError::AmbiguousAxis`] if `axis` is out of range or does not
    ///   have size 3
    /// - [`SdfError::BatchShapeMismatch`] if `data` does not match `shape` or
    ///   the shapes do not broadcast
    pub fn transform_points(
        &self,
        data: &[f64],
        shape: &[usize],
        axis: isize,
    ) -> Result<(Vec<f64>, Vec<usize>)> {
        let ambiguous = || SdfError::AmbiguousAxis {
            axis,
            shape: shape.to_vec(),
        };
        let position = normalize_axis(axis, shape.len()).ok_or_else(ambiguous)?;
        if shape[position] != 3 {
            return Err(ambiguous());
        }
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(SdfError::BatchShapeMismatch(format!(
                "{} values for point shape {shape:?}",
                data.len()
            )));
        }

        let mut point_shape = shape.to_vec();
        point_shape.remove(position);
        let out_batch = broadcast_shapes(&self.shape, &point_shape)?;
        let trailing = shape.len() - 1 - position;
        let out_position = out_batch.len() - trailing;
        let mut out_shape = out_batch.clone();
        out_shape.insert(out_position, 3);

        let count: usize = out_batch.iter().product();
        let mut out = vec![0.0; count * 3];
        for flat in 0..count {
            let index = unravel(flat, &out_batch);
            let batch_index = broadcast_index(&index, &self.shape);
            let transform = &self.transforms[ravel(&batch_index, &self.shape)];

            let mut source = broadcast_index(&index, &point_shape);
            source.insert(position, 0);
            let mut point = Point3::origin();
            for c in 0..3 {
                source[position] = c;
                point[c] = data[ravel(&source, shape)];
            }

            let mapped = transform * point;
            let mut dest = index;
            dest.insert(out_position, 0);
            for c in 0..3 {
                dest[out_position] = c;
                out[ravel(&dest, &out_shape)] = mapped[c];
            }
        }
        Ok((out, out_shape))
    }
}

impl<'a> IntoIterator for &'a BatchTransform {
    type Item = &'a Isometry3<f64>;
    type IntoIter = std::slice::Iter<'a, Isometry3<f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.transforms.iter()
    }
}

// ============================================================================
// Shape helpers
// ============================================================================

/// Map a possibly negative axis into `0..ndim`.
fn normalize_axis(axis: isize, ndim: usize) -> Option<usize> {
    let ndim = isize::try_from(ndim).ok()?;
    let axis = if axis < 0 { axis + ndim } else { axis };
    if (0..ndim).contains(&axis) {
        usize::try_from(axis).ok()
    } else {
        None
    }
}

/// Broadcast two shapes with numpy rules.
///
/// # Errors
///
/// Returns [`SdfError::BatchShapeMismatch`] if a dimension pair is neither
/// equal nor contains a one.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let n = a.len().max(b.len());
    let dim = |shape: &[usize], i: usize| {
        let offset = n - shape.len();
        if i < offset { 1 } else { shape[i - offset] }
    };
    (0..n)
        .map(|i| match (dim(a, i), dim(b, i)) {
            (x, y) if x == y || y == 1 => Ok(x),
            (1, y) => Ok(y),
            _ => Err(SdfError::BatchShapeMismatch(format!(
                "shapes {a:?} and {b:?} do not broadcast"
            ))),
        })
        .collect()
}

/// Flat row-major offset of a multi-dimensional index.
pub fn ravel(index: &[usize], shape: &[usize]) -> usize {
    index
        .iter()
        .zip(shape)
        .fold(0, |flat, (i, n)| flat * n + i)
}

/// Multi-dimensional index of a flat row-major offset.
pub fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (slot, n) in index.iter_mut().zip(shape).rev() {
        if *n > 0 {
            *slot = flat % n;
            flat /= n;
        }
    }
    index
}

/// Index into `shape` that an index into a broadcast shape reads from.
fn broadcast_index(index: &[usize], shape: &[usize]) -> Vec<usize> {
    let offset = index.len() - shape.len();
    shape
        .iter()
        .enumerate()
        .map(|(i, n)| if *n == 1 { 0 } else { index[offset + i] })
        .collect()
}
