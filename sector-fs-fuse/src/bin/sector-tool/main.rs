mod cli;

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use sector_fs::{Directory, SectorDisk, ROOT_DIR_SECTOR};
use sector_fs_fuse::BlockFile;

fn main() -> io::Result<ExitCode> {
    env_logger::init();

    match Cli::parse().command {
        Command::Format { image, sectors } => {
            let fd = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&image)?;
            let disk: Arc<dyn SectorDisk> = Arc::new(BlockFile::create(fd, sectors));
            sector_fs::format(&disk);
            println!("formatted {}: {} sectors", image.display(), sectors);
        }

        Command::Check { image } => {
            let disk: Arc<dyn SectorDisk> = Arc::new(BlockFile::open(File::open(image)?));
            if !sector_fs::check(&disk) {
                eprintln!("file system is inconsistent");
                return Ok(ExitCode::FAILURE);
            }
            println!("file system is consistent");
        }

        Command::List { image } => {
            let disk: Arc<dyn SectorDisk> = Arc::new(BlockFile::open(File::open(image)?));
            let root = sector_fs::File::new(disk.clone(), ROOT_DIR_SECTOR);
            let mut dir = Directory::new(0);
            dir.fetch_from(&root);

            let mut names = Vec::new();
            dir.list(&disk, "", &mut names);
            for name in names {
                println!("{name}");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
