use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ncch::{
    config::LoaderConfig,
    loader::{load_file, BootContext},
};

#[derive(Debug, Args)]
pub struct Boot {
    /// CXI, CCI/3DS, ELF, 3DSX or raw code file
    #[arg(short = 'i', long)]
    input: PathBuf,
}

impl Boot {
    pub fn run(&self, config: &LoaderConfig) -> Result<()> {
        let mut context = BootContext::new();
        let file_type = load_file(&self.input, &mut context, config)?;

        println!("Booted {} as {file_type}", self.input.display());
        if let Some(program_id) = context.program_id {
            println!("  Program ID . : {program_id:016x}");
        }
        for (id, range) in &context.archives {
            println!("  {id} archive : {} at {:#x}, size {:#x}", range.path().display(), range.offset(), range.size());
        }
        Ok(())
    }
}
