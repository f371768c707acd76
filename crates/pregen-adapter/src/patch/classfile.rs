//! JVM class file model
//!
//! Just enough structure to rewrite a class: the constant pool is decoded,
//! members and attributes are kept as raw bytes except where a rewrite needs
//! to look inside them ([`CodeAttribute`](super::code::CodeAttribute)).

/// Class file magic number
pub const MAGIC: u32 = 0xCAFE_BABE;

/// `ACC_PUBLIC`
pub const ACC_PUBLIC: u16 = 0x0001;
/// `ACC_STATIC`
pub const ACC_STATIC: u16 = 0x0008;
/// `ACC_VOLATILE`
pub const ACC_VOLATILE: u16 = 0x0040;

/// Structural errors in a class file
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassFormatError {
    /// Input ended early
    #[error("truncated while reading {0}")]
    Truncated(&'static str),

    /// Wrong magic number
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),

    /// Unknown constant pool tag
    #[error("unknown constant tag {tag} at index {index}")]
    BadConstantTag {
        /// Pool index
        index: u16,
        /// Tag byte
        tag: u8,
    },

    /// Pool index out of range or of the wrong kind
    #[error("constant pool index {index} is not a {expected}")]
    BadConstantIndex {
        /// Pool index
        index: u16,
        /// Expected constant kind
        expected: &'static str,
    },

    /// Pool would exceed 65535 slots
    #[error("constant pool overflow")]
    PoolOverflow,

    /// Trailing bytes after the last attribute
    #[error("{0} trailing bytes after class file")]
    TrailingBytes(usize),

    /// Unknown bytecode
    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode {
        /// Code offset
        offset: usize,
        /// Opcode byte
        opcode: u8,
    },

    /// Relocated branch no longer fits its encoding
    #[error("branch at offset {0} overflows after relocation")]
    BranchOverflow(usize),

    /// Code array exceeds 65535 bytes
    #[error("code too large: {0} bytes")]
    CodeTooLarge(usize),

    /// Unknown stack map frame type
    #[error("unknown stack map frame type {0}")]
    BadFrame(u8),

    /// Unknown verification type tag
    #[error("unknown verification type tag {0}")]
    BadVerificationType(u8),
}

/// Constant pool entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Modified UTF-8 bytes
    Utf8(Vec<u8>),
    /// `int` bits
    Integer(u32),
    /// `float` bits
    Float(u32),
    /// `long` bits
    Long(u64),
    /// `double` bits
    Double(u64),
    /// Class by name index
    Class(u16),
    /// String literal by UTF-8 index
    String(u16),
    /// Field reference
    FieldRef {
        /// Class index
        class: u16,
        /// Name-and-type index
        name_and_type: u16,
    },
    /// Method reference
    MethodRef {
        /// Class index
        class: u16,
        /// Name-and-type index
        name_and_type: u16,
    },
    /// Interface method reference
    InterfaceMethodRef {
        /// Class index
        class: u16,
        /// Name-and-type index
        name_and_type: u16,
    },
    /// Name and descriptor pair
    NameAndType {
        /// Name index
        name: u16,
        /// Descriptor index
        descriptor: u16,
    },
    /// Method handle
    MethodHandle {
        /// Reference kind
        kind: u8,
        /// Reference index
        reference: u16,
    },
    /// Method type by descriptor index
    MethodType(u16),
    /// Dynamically computed constant
    Dynamic {
        /// Bootstrap method index
        bootstrap: u16,
        /// Name-and-type index
        name_and_type: u16,
    },
    /// Dynamically computed call site
    InvokeDynamic {
        /// Bootstrap method index
        bootstrap: u16,
        /// Name-and-type index
        name_and_type: u16,
    },
    /// Module by name index
    Module(u16),
    /// Package by name index
    Package(u16),
    /// Slot 0, and the slot following a `Long` or `Double`
    Unusable,
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }
}

/// Constant pool, indexed from 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Empty pool
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }

    /// `constant_pool_count` as written to the class file
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Entry at index
    ///
    /// # Errors
    /// Returns [`ClassFormatError::BadConstantIndex`] for index 0, unusable
    /// slots and out-of-range indices.
    pub fn get(&self, index: u16) -> Result<&Constant, ClassFormatError> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => Err(ClassFormatError::BadConstantIndex {
                index,
                expected: "usable constant",
            }),
            Some(constant) => Ok(constant),
        }
    }

    /// UTF-8 bytes at index
    ///
    /// # Errors
    /// Returns [`ClassFormatError::BadConstantIndex`] if the slot is not UTF-8.
    pub fn utf8(&self, index: u16) -> Result<&[u8], ClassFormatError> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(bytes),
            _ => Err(ClassFormatError::BadConstantIndex {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Internal name of the class constant at index
    ///
    /// # Errors
    /// Returns [`ClassFormatError::BadConstantIndex`] if the slot is not a
    /// class whose name is UTF-8.
    pub fn class_name(&self, index: u16) -> Result<&[u8], ClassFormatError> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(ClassFormatError::BadConstantIndex {
                index,
                expected: "Class",
            }),
        }
    }

    /// Index of an existing UTF-8 constant
    #[must_use]
    pub fn find_utf8(&self, value: &[u8]) -> Option<u16> {
        self.entries
            .iter()
            .position(|c| matches!(c, Constant::Utf8(bytes) if bytes == value))
            .and_then(|i| u16::try_from(i).ok())
    }

    /// Index of a UTF-8 constant, appending it if absent
    ///
    /// # Errors
    /// Returns [`ClassFormatError::PoolOverflow`] if the pool is full.
    pub fn utf8_index(&mut self, value: &str) -> Result<u16, ClassFormatError> {
        match self.find_utf8(value.as_bytes()) {
            Some(index) => Ok(index),
            None => self.push(Constant::Utf8(value.as_bytes().to_vec())),
        }
    }

    /// Append a constant, returning its index
    ///
    /// # Errors
    /// Returns [`ClassFormatError::PoolOverflow`] if the pool is full.
    pub fn push(&mut self, constant: Constant) -> Result<u16, ClassFormatError> {
        let wide = constant.is_wide();
        let needed = self.entries.len() + if wide { 2 } else { 1 };
        if needed > usize::from(u16::MAX) {
            return Err(ClassFormatError::PoolOverflow);
        }
        let index = u16::try_from(self.entries.len()).map_err(|_| ClassFormatError::PoolOverflow)?;
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ClassFormatError> {
        let count = reader.u16("constant_pool_count")?;
        let mut pool = Self::new();
        while pool.entries.len() < usize::from(count) {
            let index = u16::try_from(pool.entries.len()).map_err(|_| ClassFormatError::PoolOverflow)?;
            let tag = reader.u8("constant tag")?;
            let constant = match tag {
                1 => {
                    let len = reader.u16("utf8 length")?;
                    Constant::Utf8(reader.take(usize::from(len), "utf8 bytes")?.to_vec())
                }
                3 => Constant::Integer(reader.u32("integer")?),
                4 => Constant::Float(reader.u32("float")?),
                5 => Constant::Long(reader.u64("long")?),
                6 => Constant::Double(reader.u64("double")?),
                7 => Constant::Class(reader.u16("class")?),
                8 => Constant::String(reader.u16("string")?),
                9 => Constant::FieldRef {
                    class: reader.u16("fieldref")?,
                    name_and_type: reader.u16("fieldref")?,
                },
                10 => Constant::MethodRef {
                    class: reader.u16("methodref")?,
                    name_and_type: reader.u16("methodref")?,
                },
                11 => Constant::InterfaceMethodRef {
                    class: reader.u16("interface methodref")?,
                    name_and_type: reader.u16("interface methodref")?,
                },
                12 => Constant::NameAndType {
                    name: reader.u16("name and type")?,
                    descriptor: reader.u16("name and type")?,
                },
                15 => Constant::MethodHandle {
                    kind: reader.u8("method handle")?,
                    reference: reader.u16("method handle")?,
                },
                16 => Constant::MethodType(reader.u16("method type")?),
                17 => Constant::Dynamic {
                    bootstrap: reader.u16("dynamic")?,
                    name_and_type: reader.u16("dynamic")?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap: reader.u16("invokedynamic")?,
                    name_and_type: reader.u16("invokedynamic")?,
                },
                19 => Constant::Module(reader.u16("module")?),
                20 => Constant::Package(reader.u16("package")?),
                tag => return Err(ClassFormatError::BadConstantTag { index, tag }),
            };
            let wide = constant.is_wide();
            pool.entries.push(constant);
            if wide {
                pool.entries.push(Constant::Unusable);
            }
        }
        Ok(pool)
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, len_u16(self.entries.len()));
        for constant in &self.entries {
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(bytes) => {
                    out.push(1);
                    put_u16(out, len_u16(bytes.len()));
                    out.extend_from_slice(bytes);
                }
                Constant::Integer(v) => {
                    out.push(3);
                    put_u32(out, *v);
                }
                Constant::Float(v) => {
                    out.push(4);
                    put_u32(out, *v);
                }
                Constant::Long(v) => {
                    out.push(5);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Double(v) => {
                    out.push(6);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                Constant::Class(i) => put_tag_u16(out, 7, *i),
                Constant::String(i) => put_tag_u16(out, 8, *i),
                Constant::FieldRef {
                    class,
                    name_and_type,
                } => put_tag_pair(out, 9, *class, *name_and_type),
                Constant::MethodRef {
                    class,
                    name_and_type,
                } => put_tag_pair(out, 10, *class, *name_and_type),
                Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => put_tag_pair(out, 11, *class, *name_and_type),
                Constant::NameAndType { name, descriptor } => {
                    put_tag_pair(out, 12, *name, *descriptor);
                }
                Constant::MethodHandle { kind, reference } => {
                    out.push(15);
                    out.push(*kind);
                    put_u16(out, *reference);
                }
                Constant::MethodType(i) => put_tag_u16(out, 16, *i),
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                } => put_tag_pair(out, 17, *bootstrap, *name_and_type),
                Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => put_tag_pair(out, 18, *bootstrap, *name_and_type),
                Constant::Module(i) => put_tag_u16(out, 19, *i),
                Constant::Package(i) => put_tag_u16(out, 20, *i),
            }
        }
    }
}

/// Raw attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Name index (UTF-8)
    pub name: u16,
    /// Attribute body
    pub data: Vec<u8>,
}

impl Attribute {
    pub(crate) fn read_all(reader: &mut Reader<'_>) -> Result<Vec<Self>, ClassFormatError> {
        let count = reader.u16("attributes_count")?;
        let mut attributes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let name = reader.u16("attribute name")?;
            let len = reader.u32("attribute length")?;
            let len = usize::try_from(len).map_err(|_| ClassFormatError::Truncated("attribute"))?;
            let data = reader.take(len, "attribute body")?.to_vec();
            attributes.push(Self { name, data });
        }
        Ok(attributes)
    }

    pub(crate) fn write_all(attributes: &[Self], out: &mut Vec<u8>) {
        put_u16(out, len_u16(attributes.len()));
        for attribute in attributes {
            put_u16(out, attribute.name);
            put_u32(out, u32::try_from(attribute.data.len()).unwrap_or(u32::MAX));
            out.extend_from_slice(&attribute.data);
        }
    }
}

/// Field or method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Access flags
    pub access: u16,
    /// Name index
    pub name: u16,
    /// Descriptor index
    pub descriptor: u16,
    /// Member attributes
    pub attributes: Vec<Attribute>,
}

impl Member {
    fn read_all(reader: &mut Reader<'_>, what: &'static str) -> Result<Vec<Self>, ClassFormatError> {
        let count = reader.u16(what)?;
        let mut members = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            members.push(Self {
                access: reader.u16(what)?,
                name: reader.u16(what)?,
                descriptor: reader.u16(what)?,
                attributes: Attribute::read_all(reader)?,
            });
        }
        Ok(members)
    }

    fn write_all(members: &[Self], out: &mut Vec<u8>) {
        put_u16(out, len_u16(members.len()));
        for member in members {
            put_u16(out, member.access);
            put_u16(out, member.name);
            put_u16(out, member.descriptor);
            Attribute::write_all(&member.attributes, out);
        }
    }

    /// Whether `ACC_STATIC` is set
    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }
}

/// Parsed class file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    /// Minor version
    pub minor: u16,
    /// Major version
    pub major: u16,
    /// Constant pool
    pub pool: ConstantPool,
    /// Class access flags
    pub access: u16,
    /// This-class index
    pub this_class: u16,
    /// Super-class index (0 for `java/lang/Object`)
    pub super_class: u16,
    /// Interface indices
    pub interfaces: Vec<u16>,
    /// Fields
    pub fields: Vec<Member>,
    /// Methods
    pub methods: Vec<Member>,
    /// Class attributes
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Parse class file bytes
    ///
    /// # Errors
    /// Returns [`ClassFormatError`] for anything that is not a well-formed
    /// class file.
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassFormatError> {
        let mut reader = Reader::new(bytes);
        let magic = reader.u32("magic")?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor = reader.u16("minor_version")?;
        let major = reader.u16("major_version")?;
        let pool = ConstantPool::read(&mut reader)?;
        let access = reader.u16("access_flags")?;
        let this_class = reader.u16("this_class")?;
        let super_class = reader.u16("super_class")?;
        let interface_count = reader.u16("interfaces_count")?;
        let mut interfaces = Vec::with_capacity(usize::from(interface_count));
        for _ in 0..interface_count {
            interfaces.push(reader.u16("interface")?);
        }
        let fields = Member::read_all(&mut reader, "field")?;
        let methods = Member::read_all(&mut reader, "method")?;
        let attributes = Attribute::read_all(&mut reader)?;
        if reader.remaining() > 0 {
            return Err(ClassFormatError::TrailingBytes(reader.remaining()));
        }
        Ok(Self {
            minor,
            major,
            pool,
            access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Serialize to class file bytes
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u32(&mut out, MAGIC);
        put_u16(&mut out, self.minor);
        put_u16(&mut out, self.major);
        self.pool.write(&mut out);
        put_u16(&mut out, self.access);
        put_u16(&mut out, self.this_class);
        put_u16(&mut out, self.super_class);
        put_u16(&mut out, len_u16(self.interfaces.len()));
        for interface in &self.interfaces {
            put_u16(&mut out, *interface);
        }
        Member::write_all(&self.fields, &mut out);
        Member::write_all(&self.methods, &mut out);
        Attribute::write_all(&self.attributes, &mut out);
        out
    }

    /// Internal (slash-separated) name of this class
    ///
    /// # Errors
    /// Returns [`ClassFormatError::BadConstantIndex`] if `this_class` is
    /// malformed.
    pub fn internal_name(&self) -> Result<String, ClassFormatError> {
        Ok(String::from_utf8_lossy(self.pool.class_name(self.this_class)?).into_owned())
    }

    /// Dotted binary name of this class
    ///
    /// # Errors
    /// As [`ClassFile::internal_name`].
    pub fn binary_name(&self) -> Result<String, ClassFormatError> {
        Ok(self.internal_name()?.replace('/', "."))
    }

    /// Name of a member
    ///
    /// # Errors
    /// Returns [`ClassFormatError::BadConstantIndex`] for a bad name index.
    pub fn member_name<'a>(&'a self, member: &Member) -> Result<&'a [u8], ClassFormatError> {
        self.pool.utf8(member.name)
    }

    /// Field with the given name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Member> {
        self.fields
            .iter()
            .find(|f| self.pool.utf8(f.name).is_ok_and(|n| n == name.as_bytes()))
    }

    /// Methods with the given name
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Member> + 'a {
        self.methods
            .iter()
            .filter(move |m| self.pool.utf8(m.name).is_ok_and(|n| n == name.as_bytes()))
    }
}

/// Big-endian cursor over class file bytes
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], ClassFormatError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ClassFormatError::Truncated(what))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self, what: &'static str) -> Result<u8, ClassFormatError> {
        Ok(self.take(1, what)?[0])
    }

    pub(crate) fn u16(&mut self, what: &'static str) -> Result<u16, ClassFormatError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self, what: &'static str) -> Result<u32, ClassFormatError> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, ClassFormatError> {
        let b = self.take(8, what)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }
}

pub(crate) fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_tag_u16(out: &mut Vec<u8>, tag: u8, value: u16) {
    out.push(tag);
    put_u16(out, value);
}

fn put_tag_pair(out: &mut Vec<u8>, tag: u8, a: u16, b: u16) {
    out.push(tag);
    put_u16(out, a);
    put_u16(out, b);
}

/// Counts written to the class file are bounded by the format; parsed input
/// never exceeds them and additions are checked where they happen.
pub(crate) fn len_u16(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> ClassFile {
        let mut pool = ConstantPool::new();
        let name = pool.utf8_index("a/b/Thing").unwrap();
        let this_class = pool.push(Constant::Class(name)).unwrap();
        let object = pool.utf8_index("java/lang/Object").unwrap();
        let super_class = pool.push(Constant::Class(object)).unwrap();
        let field_name = pool.utf8_index("count").unwrap();
        let int = pool.utf8_index("I").unwrap();
        pool.push(Constant::Long(42)).unwrap();
        ClassFile {
            minor: 0,
            major: 52,
            pool,
            access: ACC_PUBLIC,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![Member {
                access: ACC_PUBLIC,
                name: field_name,
                descriptor: int,
                attributes: vec![],
            }],
            methods: vec![],
            attributes: vec![],
        }
    }

    #[test]
    fn write_then_parse_preserves_structure() {
        let class = minimal();
        let parsed = ClassFile::parse(&class.to_bytes()).unwrap();
        assert_eq!(parsed, class);
        assert_eq!(parsed.binary_name().unwrap(), "a.b.Thing");
        assert!(parsed.field("count").is_some());
        assert!(parsed.field("missing").is_none());
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.push(Constant::Double(1)).unwrap();
        let next = pool.push(Constant::Integer(2)).unwrap();
        assert_eq!(next, long + 2);
        assert!(pool.get(long + 1).is_err());
    }

    #[test]
    fn utf8_index_reuses_existing() {
        let mut pool = ConstantPool::new();
        let a = pool.utf8_index("x").unwrap();
        let b = pool.utf8_index("x").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.count(), 2);
    }

    #[test]
    fn bad_magic_rejected() {
        let err = ClassFile::parse(&[0, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, ClassFormatError::BadMagic(0));
    }

    #[test]
    fn truncated_rejected() {
        let bytes = minimal().to_bytes();
        let err = ClassFile::parse(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, ClassFormatError::Truncated(_)));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = minimal().to_bytes();
        bytes.push(0);
        assert_eq!(
            ClassFile::parse(&bytes).unwrap_err(),
            ClassFormatError::TrailingBytes(1)
        );
    }
}
