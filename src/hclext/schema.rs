#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaMode {
    #[default]
    Default,
    /// Take every attribute and reject nested blocks.
    JustAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    pub name: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSchema {
    pub ty: String,
    pub label_names: Vec<String>,
    pub body: BodySchema,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodySchema {
    pub mode: SchemaMode,
    pub attributes: Vec<AttributeSchema>,
    pub blocks: Vec<BlockSchema>,
}

impl BodySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn just_attributes() -> Self {
        Self {
            mode: SchemaMode::JustAttributes,
            ..Self::default()
        }
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(AttributeSchema {
            name: name.into(),
            required: false,
        });
        self
    }

    pub fn required_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(AttributeSchema {
            name: name.into(),
            required: true,
        });
        self
    }

    pub fn block(mut self, block: BlockSchema) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    pub fn block_schema(&self, ty: &str) -> Option<&BlockSchema> {
        self.blocks.iter().find(|b| b.ty == ty)
    }
}

impl BlockSchema {
    pub fn new(ty: impl Into<String>, label_names: &[&str]) -> Self {
        Self {
            ty: ty.into(),
            label_names: label_names.iter().map(|s| s.to_string()).collect(),
            body: BodySchema::default(),
        }
    }

    pub fn body(mut self, body: BodySchema) -> Self {
        self.body = body;
        self
    }
}
