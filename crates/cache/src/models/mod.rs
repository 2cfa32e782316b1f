mod file;

pub(crate) use self::file::FileRow;
