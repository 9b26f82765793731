//! Static command registry, mirroring `QueryHandler::_rs_cmds`
//! (`original_source/src/QueryHandler.cc`): one entry per command name the
//! wire protocol accepts, plus whether that command consumes one of the
//! envelope's blobs.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    AddNode,
    UpdateNode,
    FindNode,
    AddEdge,
    UpdateEdge,
    FindEdge,
    AddImage,
    UpdateImage,
    FindImage,
    AddVideo,
    UpdateVideo,
    FindVideo,
    AddDescriptorSet,
    AddDescriptor,
    FindDescriptor,
    ClassifyDescriptor,
    TrainDescriptorSet,
}

impl CommandKind {
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::AddNode => "AddNode",
            CommandKind::UpdateNode => "UpdateNode",
            CommandKind::FindNode => "FindNode",
            CommandKind::AddEdge => "AddEdge",
            CommandKind::UpdateEdge => "UpdateEdge",
            CommandKind::FindEdge => "FindEdge",
            CommandKind::AddImage => "AddImage",
            CommandKind::UpdateImage => "UpdateImage",
            CommandKind::FindImage => "FindImage",
            CommandKind::AddVideo => "AddVideo",
            CommandKind::UpdateVideo => "UpdateVideo",
            CommandKind::FindVideo => "FindVideo",
            CommandKind::AddDescriptorSet => "AddDescriptorSet",
            CommandKind::AddDescriptor => "AddDescriptor",
            CommandKind::FindDescriptor => "FindDescriptor",
            CommandKind::ClassifyDescriptor => "ClassifyDescriptor",
            CommandKind::TrainDescriptorSet => "TrainDescriptorSet",
        }
    }

    /// Whether this command consumes one blob from the envelope's blob
    /// list, mirroring `RSCommand::need_blob`.
    pub fn needs_blob(self) -> bool {
        matches!(self, CommandKind::AddImage | CommandKind::AddVideo | CommandKind::AddDescriptor)
    }

    const ALL: &'static [CommandKind] = &[
        CommandKind::AddNode,
        CommandKind::UpdateNode,
        CommandKind::FindNode,
        CommandKind::AddEdge,
        CommandKind::UpdateEdge,
        CommandKind::FindEdge,
        CommandKind::AddImage,
        CommandKind::UpdateImage,
        CommandKind::FindImage,
        CommandKind::AddVideo,
        CommandKind::UpdateVideo,
        CommandKind::FindVideo,
        CommandKind::AddDescriptorSet,
        CommandKind::AddDescriptor,
        CommandKind::FindDescriptor,
        CommandKind::ClassifyDescriptor,
        CommandKind::TrainDescriptorSet,
    ];
}

/// Process-wide command name → kind map, built once and shared behind a
/// `&'static` reference from `Registry::global()`.
pub struct Registry {
    by_name: HashMap<&'static str, CommandKind>,
}

impl Registry {
    pub fn new() -> Self {
        let mut by_name = HashMap::new();
        for &kind in CommandKind::ALL {
            by_name.insert(kind.name(), kind);
        }
        Registry { by_name }
    }

    pub fn lookup(&self, name: &str) -> Option<CommandKind> {
        self.by_name.get(name).copied()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
