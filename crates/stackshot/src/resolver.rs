//! Address-to-symbol resolution.
//!
//! A [`Resolver`] opens one [`ResolveSession`] per capture, scoped to the
//! current executable. Sessions never fail a capture: anything they cannot
//! resolve comes back as an unresolved [`Frame`] carrying the platform's raw
//! description.

use crate::error::ResolverInitError;
use crate::frame::{Frame, ResolvedSymbol};
use crate::identity::ExecutableIdentity;
use crate::unwind::{main_program_base, module_info_for_address};
use object::{Object, ObjectSegment};
use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;

pub trait Resolver {
    type Session: ResolveSession;

    fn open(&self, executable: &ExecutableIdentity) -> Result<Self::Session, ResolverInitError>;
}

pub trait ResolveSession {
    /// Turns one captured address and its raw description into a frame.
    fn resolve(&mut self, address: usize, raw: String) -> Frame;
}

/// Resolves through DWARF and symbol tables with `addr2line`, loading each
/// module the first time one of its addresses shows up.
#[derive(Debug, Default, Clone, Copy)]
pub struct Addr2LineResolver;

impl Resolver for Addr2LineResolver {
    type Session = Addr2LineSession;

    fn open(&self, executable: &ExecutableIdentity) -> Result<Addr2LineSession, ResolverInitError> {
        let path = executable.path().to_string_lossy().into_owned();
        let state = load_module(&path);
        if let ModuleSymbolizerState::Failed(reason) = &state {
            return Err(ResolverInitError::LoadExecutable {
                path: executable.path().to_path_buf(),
                reason: reason.clone(),
            });
        }
        let mut modules = HashMap::new();
        modules.insert(path.clone(), state);
        Ok(Addr2LineSession {
            executable: path,
            executable_base: main_program_base(),
            modules,
        })
    }
}

enum ModuleSymbolizerState {
    Ready {
        loader: Box<addr2line::Loader>,
        linked_image_base: u64,
    },
    Failed(String),
}

pub struct Addr2LineSession {
    executable: String,
    /// Runtime base of the main program, whose `dladdr` file name is only
    /// `argv[0]` and cannot be opened from an arbitrary working directory.
    executable_base: Option<usize>,
    modules: HashMap<String, ModuleSymbolizerState>,
}

impl Addr2LineSession {
    /// Modules opened so far, the executable included.
    pub fn loaded_modules(&self) -> usize {
        self.modules.len()
    }
}

impl ResolveSession for Addr2LineSession {
    fn resolve(&mut self, address: usize, raw: String) -> Frame {
        let Some(info) = module_info_for_address(address) else {
            return Frame::unresolved(address, raw, "address is not inside any loaded module");
        };
        let module_path = match info.path {
            Some(path) if self.executable_base != Some(info.base) => path,
            _ => self.executable.clone(),
        };

        let state = match self.modules.entry(module_path.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(load_module(&module_path)),
        };

        let (loader, linked_image_base) = match state {
            ModuleSymbolizerState::Ready {
                loader,
                linked_image_base,
            } => (&**loader, *linked_image_base),
            ModuleSymbolizerState::Failed(reason) => {
                return Frame::unresolved(address, raw, reason.clone());
            }
        };

        // Return addresses point just past the call; look up the call itself.
        let Some(rel_pc) = (address as u64)
            .saturating_sub(1)
            .checked_sub(info.base as u64)
        else {
            return Frame::unresolved(
                address,
                raw,
                format!("address is below module base 0x{:x}", info.base),
            );
        };
        let Some(lookup_pc) = linked_image_base.checked_add(rel_pc) else {
            return Frame::unresolved(
                address,
                raw,
                format!(
                    "address overflow combining linked image base 0x{linked_image_base:x} with offset 0x{rel_pc:x}"
                ),
            );
        };

        let module = module_name(&module_path);
        match lookup(loader, lookup_pc) {
            Ok(Some(mut resolved)) => {
                resolved.module = Some(module);
                Frame::resolved(address, resolved)
            }
            Ok(None) => match info.symbol {
                Some(symbol) => Frame::resolved(
                    address,
                    ResolvedSymbol {
                        function: strip_rust_hash_suffix(&addr2line::demangle_auto(
                            Cow::Borrowed(symbol.name.as_str()),
                            None,
                        ))
                        .to_owned(),
                        file: None,
                        line: None,
                        column: None,
                        module: Some(module),
                    },
                ),
                None => Frame::unresolved(
                    address,
                    raw,
                    format!("no symbol in '{module}' for +0x{rel_pc:x}"),
                ),
            },
            Err(reason) => Frame::unresolved(address, raw, reason),
        }
    }
}

fn load_module(path: &str) -> ModuleSymbolizerState {
    let loader = match addr2line::Loader::new(path) {
        Ok(loader) => loader,
        Err(error) => {
            return ModuleSymbolizerState::Failed(format!("open debug object '{path}': {error}"));
        }
    };
    match linked_image_base_for_file(Path::new(path)) {
        Ok(linked_image_base) => ModuleSymbolizerState::Ready {
            loader: Box::new(loader),
            linked_image_base,
        },
        Err(reason) => ModuleSymbolizerState::Failed(reason),
    }
}

/// `Ok(None)` when the debug info has nothing at all for `lookup_pc`.
fn lookup(
    loader: &addr2line::Loader,
    lookup_pc: u64,
) -> Result<Option<ResolvedSymbol>, String> {
    let mut function_name = None::<String>;
    let mut file = None::<String>;
    let mut line = None::<u32>;
    let mut column = None::<u32>;

    let mut frames = loader
        .find_frames(lookup_pc)
        .map_err(|error| format!("lookup frames at 0x{lookup_pc:x}: {error}"))?;
    loop {
        match frames.next() {
            Ok(Some(frame)) => {
                if function_name.is_none()
                    && let Some(function) = frame.function
                {
                    let name = match function.demangle() {
                        Ok(name) => name.into_owned(),
                        Err(_) => function
                            .raw_name()
                            .map_err(|error| {
                                format!("decode function name at 0x{lookup_pc:x}: {error}")
                            })?
                            .into_owned(),
                    };
                    function_name = Some(strip_rust_hash_suffix(&name).to_owned());
                }
                if file.is_none()
                    && let Some(location) = frame.location
                    && let Some(path) = location.file
                {
                    file = Some(path.to_owned());
                    line = location.line;
                    column = location.column;
                }
                if function_name.is_some() && file.is_some() {
                    break;
                }
            }
            Ok(None) => break,
            Err(error) => return Err(format!("iterate frames at 0x{lookup_pc:x}: {error}")),
        }
    }

    if function_name.is_none()
        && let Some(symbol) = loader.find_symbol(lookup_pc)
    {
        let name = addr2line::demangle_auto(Cow::Borrowed(symbol), None);
        function_name = Some(strip_rust_hash_suffix(&name).to_owned());
    }
    if file.is_none()
        && let Ok(Some(location)) = loader.find_location(lookup_pc)
    {
        file = location.file.map(str::to_owned);
        line = location.line;
        column = location.column;
    }

    let Some(function) = function_name else {
        return Ok(None);
    };
    Ok(Some(ResolvedSymbol {
        function,
        file,
        line,
        column,
        module: None,
    }))
}

fn module_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_owned()
}

pub(crate) fn strip_rust_hash_suffix(name: &str) -> &str {
    if let Some(index) = name.rfind("::h") {
        let suffix = &name[index + 3..];
        if !suffix.is_empty()
            && suffix
                .chars()
                .all(|character| character.is_ascii_hexdigit())
        {
            return &name[..index];
        }
    }
    name
}

fn linked_image_base_for_file(path: &Path) -> Result<u64, String> {
    let data = std::fs::read(path)
        .map_err(|error| format!("read debug object '{}': {error}", path.display()))?;
    let object = object::File::parse(&*data)
        .map_err(|error| format!("parse debug object '{}': {error}", path.display()))?;
    object
        .segments()
        .filter_map(|segment| {
            let (_, file_size) = segment.file_range();
            if file_size == 0 {
                return None;
            }
            Some(segment.address())
        })
        .min()
        .ok_or_else(|| {
            format!(
                "no file-backed segments in debug object '{}'",
                path.display()
            )
        })
}
