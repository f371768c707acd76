use crate::{ClassImage, FakeRuntime};
use parking_lot::Mutex;
use pregen_adapter::{
    Adapter, AdapterParts, CommandSink, CompatibilityError, Dimension, MemoryArchive, ObjectRef,
    RuntimeError, Value, SERVER_THREAD,
};
use pregen_symbol::{ReleaseCatalog, ReleaseId, SymbolMap};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const RELEASE: &str = "1.14.4";

/// Chronological catalog covering every built-in variant
pub const CATALOG: &[&str] = &[
    "1.13", "1.14.4", "19w35a", "19w36a", "1.15.2", "20w20b", "20w21a", "20w22a", "1.16",
];

pub const MAPPING_1_14_4: &str = "\
# fake mapping for 1.14.4
net.minecraft.server.Main -> net.minecraft.server.Main:
    void main(java.lang.String[]) -> main
net.minecraft.server.MinecraftServer -> bx:
    boolean isReady -> ab
    62:64:net.minecraft.server.level.ServerLevel getLevel(net.minecraft.world.level.dimension.DimensionType) -> a
net.minecraft.server.dedicated.DedicatedServer -> dg:
net.minecraft.world.level.Level -> bhr:
    net.minecraft.world.level.chunk.ChunkAccess getChunk(int,int) -> a
net.minecraft.world.level.dimension.DimensionType -> byn:
    net.minecraft.world.level.dimension.DimensionType OVERWORLD -> a
    net.minecraft.world.level.dimension.DimensionType NETHER -> b
    net.minecraft.world.level.dimension.DimensionType THE_END -> c
";

const ENTRY: &str = "net.minecraft.server.Main";

#[derive(Default)]
struct World {
    levels: HashMap<ObjectRef, Dimension>,
    keys: HashMap<ObjectRef, Dimension>,
    chunks: Vec<(Dimension, i32, i32)>,
    launch_args: Vec<Vec<String>>,
}

/// Builder for [`FakeServer`]
#[derive(Debug, Clone)]
pub struct FakeServerBuilder {
    mapping: String,
    ready_after: usize,
    kill_after: Option<usize>,
    missing_level: Option<Dimension>,
    omit_fields: Vec<(String, String)>,
    exit_on_launch: bool,
}

impl Default for FakeServerBuilder {
    fn default() -> Self {
        Self {
            mapping: MAPPING_1_14_4.to_string(),
            ready_after: 0,
            kill_after: None,
            missing_level: None,
            omit_fields: Vec::new(),
            exit_on_launch: false,
        }
    }
}

impl FakeServerBuilder {
    /// `isReady` reads `false` this many times before turning `true`
    pub fn ready_after(mut self, reads: usize) -> Self {
        self.ready_after = reads;
        self
    }

    /// Server thread dies after this many `getChunk` calls
    pub fn kill_after(mut self, chunks: usize) -> Self {
        self.kill_after = Some(chunks);
        self
    }

    /// `getLevel` returns null for this dimension
    pub fn missing_level(mut self, dimension: Dimension) -> Self {
        self.missing_level = Some(dimension);
        self
    }

    /// Remove mapping lines containing `needle`
    pub fn drop_mapping_lines(mut self, needle: &str) -> Self {
        self.mapping = self
            .mapping
            .lines()
            .filter(|line| !line.contains(needle))
            .map(|line| format!("{line}\n"))
            .collect();
        self
    }

    /// Leave a mapped field out of the binary
    pub fn omit_field(mut self, owner: &str, field: &str) -> Self {
        self.omit_fields.push((owner.to_string(), field.to_string()));
        self
    }

    /// Entry point returns without starting the server thread
    pub fn exit_on_launch(mut self) -> Self {
        self.exit_on_launch = true;
        self
    }

    fn keeps(&self, owner: &str, field: &str) -> bool {
        !self
            .omit_fields
            .iter()
            .any(|(o, f)| o == owner && f == field)
    }

    fn archive(&self) -> MemoryArchive {
        let mut server = ClassImage::new("bx").method("a", "(Lbyn;)Lbhr;");
        if self.keeps("bx", "ab") {
            server = server.field("ab", "Z");
        }
        let mut dimension_type = ClassImage::new("byn");
        for field in ["a", "b", "c"] {
            if self.keeps("byn", field) {
                dimension_type = dimension_type.static_field(field, "Lbyn;");
            }
        }

        let mut archive = MemoryArchive::new().with_entry_point(ENTRY);
        for class in [
            ClassImage::new(ENTRY).method("main", "([Ljava/lang/String;)V"),
            server,
            ClassImage::new("dg"),
            ClassImage::new("bhr").method("a", "(II)Lcak;"),
            dimension_type,
        ] {
            archive.insert(class.name(), class.build());
        }
        archive
    }

    pub fn build(self) -> FakeServer {
        let runtime = Arc::new(FakeRuntime::new());
        let world = Arc::new(Mutex::new(World::default()));
        let ready_reads = Arc::new(AtomicUsize::new(0));

        for (dimension, field) in [
            (Dimension::Overworld, "a"),
            (Dimension::Nether, "b"),
            (Dimension::End, "c"),
        ] {
            let key = runtime.allocate("byn");
            world.lock().keys.insert(key, dimension);
            runtime.set_static("byn", field, Value::Object(key));
        }

        {
            let world = Arc::clone(&world);
            let missing = self.missing_level;
            let exit_on_launch = self.exit_on_launch;
            runtime.on_entry(ENTRY, move |rt, _, args| {
                if let Some(Value::StrArray(args)) = args.first() {
                    world.lock().launch_args.push(args.clone());
                }
                if exit_on_launch {
                    return Ok(Value::Void);
                }
                rt.construct("dg");
                for dimension in Dimension::ALL {
                    if Some(dimension) != missing {
                        let level = rt.construct("bhr");
                        world.lock().levels.insert(level, dimension);
                    }
                }
                rt.start_thread(SERVER_THREAD);
                Ok(Value::Void)
            });
        }

        {
            let reads = Arc::clone(&ready_reads);
            let ready_after = self.ready_after;
            runtime.on_field_read("bx", "ab", move |_, _| {
                let seen = reads.fetch_add(1, Ordering::SeqCst);
                Value::Bool(seen >= ready_after)
            });
        }

        {
            let world = Arc::clone(&world);
            runtime.on_method("bx", "a", &["byn"], move |_, target, args| {
                if target.is_none() {
                    return Err(RuntimeError::MissingReceiver("bx.a(byn)".to_string()));
                }
                let world = world.lock();
                let dimension = args
                    .first()
                    .and_then(Value::as_object)
                    .and_then(|key| world.keys.get(&key).copied());
                let level = world
                    .levels
                    .iter()
                    .find(|(_, d)| Some(**d) == dimension)
                    .map(|(level, _)| *level);
                Ok(level.map_or(Value::Null, Value::Object))
            });
        }

        {
            let world = Arc::clone(&world);
            let kill_after = self.kill_after;
            runtime.on_method("bhr", "a", &["int", "int"], move |rt, target, args| {
                let level = target.ok_or_else(|| RuntimeError::MissingReceiver("bhr.a".to_string()))?;
                let (Some(Value::Int(x)), Some(Value::Int(z))) = (args.first(), args.get(1)) else {
                    return Err(RuntimeError::Raised {
                        member: "bhr.a".to_string(),
                        message: "expected (int, int)".to_string(),
                    });
                };
                let mut world = world.lock();
                let dimension = world.levels.get(&level).copied().ok_or_else(|| RuntimeError::Raised {
                    member: "bhr.a".to_string(),
                    message: "receiver is not a level".to_string(),
                })?;
                world.chunks.push((dimension, *x, *z));
                if kill_after.is_some_and(|n| world.chunks.len() >= n) {
                    rt.stop_thread(SERVER_THREAD);
                }
                Ok(Value::Null)
            });
        }

        let archive = Arc::new(self.archive());
        let symbols = Arc::new(SymbolMap::parse_str(ReleaseId::new(RELEASE), &self.mapping));
        FakeServer {
            runtime,
            archive,
            symbols,
            catalog: Arc::new(ReleaseCatalog::chronological(CATALOG.iter().copied())),
            world,
            ready_reads,
        }
    }
}

/// Scripted 1.14.4 server
pub struct FakeServer {
    pub runtime: Arc<FakeRuntime>,
    pub archive: Arc<MemoryArchive>,
    pub symbols: Arc<SymbolMap>,
    pub catalog: Arc<ReleaseCatalog>,
    world: Arc<Mutex<World>>,
    ready_reads: Arc<AtomicUsize>,
}

impl FakeServer {
    pub fn builder() -> FakeServerBuilder {
        FakeServerBuilder::default()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn parts(&self) -> AdapterParts {
        AdapterParts::new(
            Arc::clone(&self.symbols),
            self.catalog.clone(),
            self.runtime.clone(),
            self.archive.clone(),
        )
        .unwrap()
    }

    pub fn prepare(&self) -> Result<Adapter, CompatibilityError> {
        Adapter::prepare(self.parts())
    }

    pub fn console(&self) -> Arc<FakeConsole> {
        Arc::new(FakeConsole {
            runtime: Arc::clone(&self.runtime),
            lines: Mutex::new(Vec::new()),
        })
    }

    /// `getChunk` calls in order
    pub fn chunks(&self) -> Vec<(Dimension, i32, i32)> {
        self.world.lock().chunks.clone()
    }

    pub fn launch_args(&self) -> Vec<Vec<String>> {
        self.world.lock().launch_args.clone()
    }

    pub fn ready_reads(&self) -> usize {
        self.ready_reads.load(Ordering::SeqCst)
    }

    pub fn kill(&self) {
        self.runtime.stop_thread(SERVER_THREAD);
    }
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Console that stops the server on `stop`
pub struct FakeConsole {
    runtime: Arc<FakeRuntime>,
    lines: Mutex<Vec<String>>,
}

impl FakeConsole {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl CommandSink for FakeConsole {
    fn send(&self, line: &str) -> std::io::Result<()> {
        self.lines.lock().push(line.to_string());
        if line.trim() == "stop" {
            self.runtime.stop_thread(SERVER_THREAD);
        }
        Ok(())
    }
}
