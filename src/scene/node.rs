//! Transform nodes and the scene tree

use glam::{Mat4, Quat, Vec3};

use crate::scene::{FrameState, Renderable, SceneError, Transform, UpdateMode};

/// A node of the scene tree.
///
/// Children are owned, so a node has exactly one parent and cycles cannot be
/// built. A node with a [`Renderable`] is a render entity.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    transform: Transform,
    renderable: Option<Renderable>,
    children: Vec<Node>,
    last_updated_frame: Option<u64>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            renderable: None,
            children: Vec::new(),
            last_updated_frame: None,
        }
    }

    /// A render entity
    pub fn entity(name: impl Into<String>, renderable: Renderable) -> Self {
        Self::new(name).with_renderable(renderable)
    }

    pub fn with_renderable(mut self, renderable: Renderable) -> Self {
        self.renderable = Some(renderable);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self.transform.mark_dirty();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    pub fn set_translation(&mut self, translation: Vec3, mode: UpdateMode) {
        self.transform.set_translation(translation, mode);
    }

    pub fn set_rotation(&mut self, rotation: Quat, mode: UpdateMode) {
        self.transform.set_rotation(rotation, mode);
    }

    pub fn set_scale(&mut self, scale: Vec3, mode: UpdateMode) {
        self.transform.set_scale(scale, mode);
    }

    pub fn set_model_matrix(&mut self, matrix: Mat4) -> Result<(), SceneError> {
        self.transform.set_model_matrix(matrix)
    }

    pub fn renderable(&self) -> Option<&Renderable> {
        self.renderable.as_ref()
    }

    pub fn renderable_mut(&mut self) -> Option<&mut Renderable> {
        self.renderable.as_mut()
    }

    pub fn set_renderable(&mut self, renderable: Option<Renderable>) {
        self.renderable = renderable;
    }

    /// Frame index of the last composed-matrix recompute
    pub fn last_updated_frame(&self) -> Option<u64> {
        self.last_updated_frame
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Attach `child`; sibling names must be unique
    pub fn add_child(&mut self, mut child: Node) -> Result<&mut Node, SceneError> {
        if self.child(&child.name).is_some() {
            return Err(SceneError::DuplicateChild {
                parent: self.name.clone(),
                child: child.name,
            });
        }
        child.transform.mark_dirty();
        self.children.push(child);
        let index = self.children.len() - 1;
        Ok(&mut self.children[index])
    }

    /// Detach the direct child called `name`
    pub fn remove_child(&mut self, name: &str) -> Option<Node> {
        let index = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(index))
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Depth-first search of this subtree, including the node itself
    pub fn find(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(name))
    }

    /// Detach the first descendant called `name`, searching depth-first
    pub fn detach(&mut self, name: &str) -> Option<Node> {
        if let Some(node) = self.remove_child(name) {
            return Some(node);
        }
        self.children.iter_mut().find_map(|c| c.detach(name))
    }

    /// Move the descendant `name` under the node `new_parent`
    pub fn reparent(&mut self, name: &str, new_parent: &str) -> Result<(), SceneError> {
        let node = self
            .children
            .iter()
            .find_map(|c| c.find(name))
            .ok_or_else(|| SceneError::NodeNotFound(name.to_string()))?;
        if node.find(new_parent).is_some() {
            return Err(SceneError::WouldCreateCycle {
                node: name.to_string(),
                parent: new_parent.to_string(),
            });
        }
        let target = self
            .find(new_parent)
            .ok_or_else(|| SceneError::NodeNotFound(new_parent.to_string()))?;
        if target.child(name).is_some() {
            return Err(SceneError::DuplicateChild {
                parent: new_parent.to_string(),
                child: name.to_string(),
            });
        }

        let node = self
            .detach(name)
            .ok_or_else(|| SceneError::NodeNotFound(name.to_string()))?;
        let target = self
            .find_mut(new_parent)
            .ok_or_else(|| SceneError::NodeNotFound(new_parent.to_string()))?;
        target.add_child(node)?;
        Ok(())
    }

    /// Visit this subtree in pre-order with each node's depth
    pub fn walk<F: FnMut(&Node, usize)>(&self, mut visit: F) {
        self.walk_inner(0, &mut visit);
    }

    fn walk_inner<F: FnMut(&Node, usize)>(&self, depth: usize, visit: &mut F) {
        visit(self, depth);
        for child in &self.children {
            child.walk_inner(depth + 1, visit);
        }
    }

    /// Recompute composed matrices for this subtree, treating `self` as a root.
    ///
    /// Every node is visited. A node is recomputed when it is dirty, an
    /// ancestor was recomputed, or the camera changed. Returns the number of
    /// recomputed nodes.
    pub fn update_frame_state(&mut self, frame: &FrameState) -> usize {
        self.update_subtree(Mat4::IDENTITY, false, frame)
    }

    fn update_subtree(
        &mut self,
        parent_world: Mat4,
        parent_changed: bool,
        frame: &FrameState,
    ) -> usize {
        let changed = parent_changed || frame.camera_dirty || self.transform.is_dirty();
        let mut updated = 0;
        if changed {
            self.transform
                .update_composed(parent_world, frame.view_projection);
            self.last_updated_frame = Some(frame.frame);
            updated += 1;
        }

        let world = self.transform.world_matrix();
        for child in &mut self.children {
            updated += child.update_subtree(world, changed, frame);
        }
        updated
    }

    /// Split borrows for the draw collection walk
    pub(crate) fn parts_mut(&mut self) -> (&str, &Transform, Option<&mut Renderable>, &mut [Node]) {
        (
            &self.name,
            &self.transform,
            self.renderable.as_mut(),
            &mut self.children,
        )
    }
}
