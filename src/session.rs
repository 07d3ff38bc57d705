//! Interactive viewing session.
//!
//! A [`Session`] owns the active group set for one document pair and the
//! hover/pin state of every group. Rendering is two-phase: [`Session::render`]
//! builds segments synchronously; connector geometry is requested with
//! [`Session::request_geometry`] and only computed once the host reports a
//! stable layout through [`Session::layout_stable`]. A render that happens in
//! between supersedes the pending request.

use std::collections::HashMap;
use tracing::debug;

use crate::file::Document;
use crate::render::{Connector, GroupDetail, Rendered, describe, render_pair};
use crate::store::{Group, GroupId};

/// Connector visibility state of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    /// Pointer is over one of the group's segments
    Hovered,
    /// Clicked; stays visible until clicked again or deleted
    Pinned,
}

/// Something the user did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    PointerEnter(GroupId),
    PointerLeave(GroupId),
    Click(GroupId),
    Delete(GroupId),
    ToggleAll,
}

/// Handle for a scheduled geometry pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryTicket {
    generation: u64,
}

pub struct Session {
    source: Document,
    target: Document,
    groups: Vec<Group>,
    states: HashMap<GroupId, Interaction>,
    show_all: bool,
    generation: u64,
    pending: Option<u64>,
    frame: Rendered,
}

impl Session {
    pub fn new(source: Document, target: Document, groups: Vec<Group>) -> Self {
        let frame = render_pair(&source, &target, &groups);
        Self {
            source,
            target,
            groups,
            states: HashMap::new(),
            show_all: false,
            generation: 0,
            pending: None,
            frame,
        }
    }

    /// Active groups
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn state(&self, id: GroupId) -> Interaction {
        self.states.get(&id).copied().unwrap_or_default()
    }

    /// Latest segment layout
    pub fn frame(&self) -> &Rendered {
        &self.frame
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Phase one: rebuild every segment from the active groups
    ///
    /// Cancels any geometry pass still waiting on the previous layout.
    pub fn render(&mut self) -> &Rendered {
        self.generation += 1;
        if let Some(stale) = self.pending.take() {
            debug!(stale, current = self.generation, "cancelled superseded geometry pass");
        }
        self.frame = render_pair(&self.source, &self.target, &self.groups);
        &self.frame
    }

    /// Schedule phase two against the current layout
    pub fn request_geometry(&mut self) -> GeometryTicket {
        self.pending = Some(self.generation);
        GeometryTicket {
            generation: self.generation,
        }
    }

    /// Phase two: the host reports that the layout for `ticket` is stable
    ///
    /// Returns the connectors to draw, or `None` if the ticket was
    /// superseded by a newer render and must be requested again.
    pub fn layout_stable(&mut self, ticket: GeometryTicket) -> Option<Vec<Connector>> {
        if self.pending != Some(ticket.generation) || ticket.generation != self.generation {
            return None;
        }
        self.pending = None;
        Some(self.visible_connectors())
    }

    /// Connectors of hovered and pinned groups, or all of them when toggled on
    pub fn visible_connectors(&self) -> Vec<Connector> {
        self.frame
            .connectors
            .iter()
            .filter(|c| self.show_all || self.state(c.group) != Interaction::Idle)
            .cloned()
            .collect()
    }

    /// Tooltip content for a hovered or pinned group
    pub fn tooltip(&self) -> Option<GroupDetail> {
        let group = self
            .groups
            .iter()
            .find(|g| self.state(g.id) == Interaction::Hovered)?;
        Some(describe(group, &self.source, &self.target))
    }

    pub fn detail(&self, id: GroupId) -> Option<GroupDetail> {
        let group = self.groups.iter().find(|g| g.id == id)?;
        Some(describe(group, &self.source, &self.target))
    }

    /// Apply an event; returns true when it forced a re-render
    pub fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::PointerEnter(id) => {
                if self.state(id) == Interaction::Idle && self.contains(id) {
                    self.states.insert(id, Interaction::Hovered);
                }
                false
            }
            Event::PointerLeave(id) => {
                if self.state(id) == Interaction::Hovered {
                    self.states.insert(id, Interaction::Idle);
                }
                false
            }
            Event::Click(id) => {
                if self.contains(id) {
                    let next = match self.state(id) {
                        Interaction::Pinned => Interaction::Idle,
                        Interaction::Idle | Interaction::Hovered => Interaction::Pinned,
                    };
                    self.states.insert(id, next);
                }
                false
            }
            Event::Delete(id) => self.delete(id),
            Event::ToggleAll => {
                self.show_all = !self.show_all;
                false
            }
        }
    }

    /// Remove a group from the active set and re-render both panes
    pub fn delete(&mut self, id: GroupId) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g.id != id);
        if self.groups.len() == before {
            return false;
        }
        self.states.remove(&id);
        debug!(group = id, remaining = self.groups.len(), "deleted group");
        self.render();
        true
    }

    fn contains(&self, id: GroupId) -> bool {
        self.groups.iter().any(|g| g.id == id)
    }
}
