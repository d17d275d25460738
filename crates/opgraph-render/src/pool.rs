//! Hoisted declaration pool.
//!
//! Every type, variable, label, member and call site referenced by the
//! body is declared once, up front, and referenced by a short identifier.
//! Identifiers are numbered per section in first-use order.

use rustc_hash::FxHashMap;

use opgraph_core::{CallSite, DataType, LabelId, RenderError, TypeHash};

/// Declaration sections, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Section {
    Types,
    Variables,
    Labels,
    Members,
    CallSites,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Types,
        Section::Variables,
        Section::Labels,
        Section::Members,
        Section::CallSites,
    ];

    fn prefix(self) -> char {
        match self {
            Section::Types => 't',
            Section::Variables => 'v',
            Section::Labels => 'l',
            Section::Members => 'm',
            Section::CallSites => 's',
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Section::Types => "types",
            Section::Variables => "variables",
            Section::Labels => "labels",
            Section::Members => "members",
            Section::CallSites => "call sites",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Deduplication key (hashable identity of a declared item).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DeclKey {
    Type(DataType),
    Variable(std::rc::Rc<str>),
    Label(LabelId),
    Member(TypeHash),
    CallSite(CallSite),
}

impl DeclKey {
    fn section(&self) -> Section {
        match self {
            DeclKey::Type(_) => Section::Types,
            DeclKey::Variable(_) => Section::Variables,
            DeclKey::Label(_) => Section::Labels,
            DeclKey::Member(_) => Section::Members,
            DeclKey::CallSite(_) => Section::CallSites,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declaration {
    pub id: String,
    pub text: String,
}

/// Declarations of one rendering.
#[derive(Debug, Default)]
pub(crate) struct DeclarationPool {
    sections: [Vec<Declaration>; 5],
    index: FxHashMap<DeclKey, String>,
}

impl DeclarationPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of an already declared item.
    pub fn get(&self, key: &DeclKey) -> Option<&str> {
        self.index.get(key).map(String::as_str)
    }

    /// Declare `key` unless present; `text` builds the right-hand side and
    /// may itself declare dependencies first.
    pub fn intern(
        &mut self,
        key: DeclKey,
        text: impl FnOnce(&mut Self) -> Result<String, RenderError>,
    ) -> Result<String, RenderError> {
        if let Some(id) = self.index.get(&key) {
            return Ok(id.clone());
        }
        let text = text(self)?;
        let section = key.section();
        let entries = &mut self.sections[section.index()];
        let id = format!("{}{}", section.prefix(), entries.len());
        entries.push(Declaration {
            id: id.clone(),
            text,
        });
        self.index.insert(key, id.clone());
        Ok(id)
    }

    /// Declarations of one section, in identifier order.
    pub fn section(&self, section: Section) -> &[Declaration] {
        &self.sections[section.index()]
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }
}
