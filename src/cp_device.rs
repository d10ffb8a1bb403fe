use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::{
    error::Result,
    radio::{
        config::SessionConfig, cps_mode::OpenMode, profile::SessionProfile, Radio,
    },
    transport::{Transport, UsbTransport},
};

/// Random access to codeplug memory, either on a live radio or in an image.
pub trait CodeplugMemory {
    fn read_at(&mut self, addr: u32, len: u64) -> Result<Vec<u8>>;

    fn write_at(&mut self, addr: u32, data: &[u8]) -> Result<()>;
}

impl<P: SessionProfile, T: Transport> CodeplugMemory for Radio<P, T> {
    fn read_at(&mut self, addr: u32, len: u64) -> Result<Vec<u8>> {
        self.read_memory(addr, len)
    }

    fn write_at(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.write_memory(addr, data)
    }
}

/// A flat codeplug image, addressed the same way as radio memory.
pub struct FileImage<F: Read + Write + Seek> {
    inner: F,
}

impl<F: Read + Write + Seek> FileImage<F> {
    pub fn new(inner: F) -> Self {
        FileImage { inner }
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl FileImage<File> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(FileImage::new(
            OpenOptions::new().read(true).write(true).open(path)?,
        ))
    }

    pub fn create(path: &Path) -> Result<Self> {
        Ok(FileImage::new(
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?,
        ))
    }
}

impl<F: Read + Write + Seek> CodeplugMemory for FileImage<F> {
    fn read_at(&mut self, addr: u32, len: u64) -> Result<Vec<u8>> {
        let mut ret = vec![0u8; len as usize];

        self.inner.seek(SeekFrom::Start(addr as u64))?;
        self.inner.read_exact(&mut ret)?;

        Ok(ret)
    }

    fn write_at(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.inner.seek(SeekFrom::Start(addr as u64))?;
        self.inner.write_all(data)?;
        self.inner.flush()?;

        Ok(())
    }
}

/// Codeplug memory to read from: the image at `path`, or the radio in CPS
/// read mode when no path is given.
pub fn get_source<P: SessionProfile + 'static>(
    path: Option<&Path>,
    config: SessionConfig,
) -> Result<Box<dyn CodeplugMemory>> {
    Ok(match path {
        Some(p) => Box::new(FileImage::open(p)?),
        None => Box::new(Radio::<P, UsbTransport>::open_usb(config, OpenMode::Read)?),
    })
}

/// Codeplug memory to write to: the image at `path`, or the radio in write
/// mode when no path is given.
pub fn get_sink<P: SessionProfile + 'static>(
    path: Option<&Path>,
    config: SessionConfig,
) -> Result<Box<dyn CodeplugMemory>> {
    Ok(match path {
        Some(p) => Box::new(FileImage::create(p)?),
        None => Box::new(Radio::<P, UsbTransport>::open_usb(config, OpenMode::Write)?),
    })
}
