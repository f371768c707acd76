//! Symbolic names used by the built-in variants

/// `MinecraftServer`
pub const MINECRAFT_SERVER: &str = "net.minecraft.server.MinecraftServer";
/// `DedicatedServer`, the type that receives the structural patch
pub const DEDICATED_SERVER: &str = "net.minecraft.server.dedicated.DedicatedServer";
/// `Level`
pub const LEVEL: &str = "net.minecraft.world.level.Level";
/// `DimensionType`
pub const DIMENSION_TYPE: &str = "net.minecraft.world.level.dimension.DimensionType";
/// `ResourceKey`
pub const RESOURCE_KEY: &str = "net.minecraft.resources.ResourceKey";

/// `MinecraftServer.isReady`
pub const IS_READY: &str = "isReady";
/// `MinecraftServer.getLevel(..)`
pub const GET_LEVEL: &str = "getLevel";
/// `Level.getChunk(int, int)`
pub const GET_CHUNK: &str = "getChunk";

/// Primitive `int`
pub const INT: &str = "int";
