use std::sync::Arc;

use sector_fs::*;

use crate::MemDisk;

fn mem_disk(sectors: u32) -> Arc<dyn SectorDisk> {
    Arc::new(MemDisk::new(sectors))
}

fn formatted(sectors: u32) -> Arc<dyn SectorDisk> {
    let disk = mem_disk(sectors);
    format(&disk);
    disk
}

fn load_free_map(disk: &Arc<dyn SectorDisk>) -> Bitmap {
    let file = File::new(disk.clone(), FREE_MAP_SECTOR);
    let mut map = Bitmap::new(disk.num_sectors());
    map.fetch_from(&file);
    map
}

fn store_free_map(disk: &Arc<dyn SectorDisk>, map: &Bitmap) {
    map.write_back(&File::new(disk.clone(), FREE_MAP_SECTOR));
}

fn snapshot(disk: &Arc<dyn SectorDisk>) -> Vec<u8> {
    let mut image = vec![0; disk.num_sectors() as usize * SECTOR_SIZE];
    for sector in 0..disk.num_sectors() {
        disk.read_sector(sector, &mut image[sector as usize * SECTOR_SIZE..][..SECTOR_SIZE]);
    }
    image
}

/// 在根目录下造一个文件，全部落盘，返回头部扇区
fn create_file(disk: &Arc<dyn SectorDisk>, name: &str, size: u32) -> u32 {
    let root = File::new(disk.clone(), ROOT_DIR_SECTOR);
    let mut map = load_free_map(disk);
    let mut dir = Directory::new(0);
    dir.fetch_from(&root);

    let sector = map.find().unwrap();
    let mut header = FileHeader::new();
    header.allocate(&mut map, size).unwrap();
    dir.add(name, sector, false, &mut map, &root).unwrap();

    header.write_back(disk, sector);
    dir.write_back(&root);
    store_free_map(disk, &map);
    sector
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

#[test]
fn bitmap_marks_and_finds() {
    let mut map = Bitmap::new(100);
    assert_eq!(map.count_clear(), 100);

    map.mark(0);
    map.mark(99);
    assert!(map.test(0) && map.test(99));
    assert_eq!(map.find(), Some(1));
    assert_eq!(map.count_clear(), 97);

    map.clear(0);
    assert_eq!(map.find(), Some(0));
}

#[test]
fn format_is_consistent() {
    let disk = formatted(128);
    assert!(check(&disk));
}

#[test]
fn format_mount_format_is_equivalent_to_format() {
    let disk = formatted(128);
    let once = snapshot(&disk);

    // “挂载”一把：把两份常驻文件读起来再放下
    let _ = File::new(disk.clone(), FREE_MAP_SECTOR);
    let _ = File::new(disk.clone(), ROOT_DIR_SECTOR);

    format(&disk);
    assert_eq!(once, snapshot(&disk));
}

#[test]
fn small_file_stays_direct() {
    let disk = formatted(128);
    let sector = create_file(&disk, "a", 250);

    let file = File::new(disk.clone(), sector);
    file.map_header(|header| {
        let raw = header.raw();
        assert_eq!(raw.num_bytes, 250);
        assert_eq!(raw.num_sectors, 250u32.div_ceil(SECTOR_SIZE as u32));
        assert_eq!(raw.indir_sector, NONE_SECTOR);
    });
    assert!(check(&disk));
}

#[test]
fn allocation_failure_leaves_free_map_untouched() {
    let disk = formatted(32);
    let mut map = load_free_map(&disk);
    let clear = map.count_clear();

    let mut header = FileHeader::new();
    assert_eq!(header.allocate(&mut map, 32 * SECTOR_SIZE as u32), Err(NoSpace));
    assert_eq!(map.count_clear(), clear);
}

#[test]
fn big_file_goes_through_indirect_tables() {
    let disk = formatted(1024);
    let size = (MAX_DIRECT_SIZE + 40 * SECTOR_SIZE) as u32;
    let sector = create_file(&disk, "big", size);

    let file = File::new(disk.clone(), sector);
    file.map_header(|header| {
        assert_eq!(header.raw().num_sectors as usize, NUM_DIRECT + 40);
        assert_ne!(header.raw().indir_sector, NONE_SECTOR);
        assert_ne!(header.first_indir()[0], NONE_SECTOR);
        assert_ne!(header.first_indir()[1], NONE_SECTOR);
        assert_eq!(header.first_indir()[2], NONE_SECTOR);

        // 第 k 个数据扇区按认领顺序单调排开，互不重复
        let sectors: Vec<u32> = (0..header.raw().num_sectors)
            .map(|k| header.byte_to_sector(k * SECTOR_SIZE as u32))
            .collect();
        for pair in sectors.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    });
    assert!(check(&disk));
}

#[test]
fn header_write_fetch_write_reproduces_image() {
    let disk = formatted(1024);
    let sector = create_file(&disk, "f", (MAX_DIRECT_SIZE + 5 * SECTOR_SIZE) as u32);
    let once = snapshot(&disk);

    let mut header = FileHeader::new();
    header.fetch_from(&disk, sector);
    header.write_back(&disk, sector);
    assert_eq!(once, snapshot(&disk));
}

#[test]
fn expand_within_last_sector_claims_nothing() {
    let disk = formatted(128);
    let sector = create_file(&disk, "f", 100);

    let mut map = load_free_map(&disk);
    let clear = map.count_clear();

    let file = File::new(disk.clone(), sector);
    file.expand(&mut map, 20).unwrap();
    store_free_map(&disk, &map);

    assert_eq!(map.count_clear(), clear);
    file.map_header(|header| {
        assert_eq!(header.raw().num_bytes, 120);
        assert_eq!(header.raw().num_sectors, 1);
    });
    assert!(check(&disk));
}

#[test]
fn expand_to_exact_direct_limit_stays_direct() {
    let disk = formatted(128);
    let sector = create_file(&disk, "f", 3500);

    let mut map = load_free_map(&disk);
    let clear = map.count_clear();

    let file = File::new(disk.clone(), sector);
    file.expand(&mut map, MAX_DIRECT_SIZE as u32 - 3500).unwrap();
    store_free_map(&disk, &map);

    // 刚好铺满直接索引：一个数据扇区，零张间接表
    assert_eq!(clear - map.count_clear(), 1);
    file.map_header(|header| {
        assert_eq!(header.raw().num_bytes as usize, MAX_DIRECT_SIZE);
        assert_eq!(header.raw().num_sectors as usize, NUM_DIRECT);
        assert_eq!(header.raw().indir_sector, NONE_SECTOR);
    });
    assert!(check(&disk));
}

#[test]
fn expand_across_direct_boundary_builds_indirection_once() {
    let disk = formatted(128);
    let sector = create_file(&disk, "f", MAX_DIRECT_SIZE as u32);

    let mut map = load_free_map(&disk);
    let clear = map.count_clear();

    let file = File::new(disk.clone(), sector);
    file.expand(&mut map, 1).unwrap();
    store_free_map(&disk, &map);

    // 新数据扇区一个、顶层间接表一张、二级间接表一张
    assert_eq!(clear - map.count_clear(), 3);
    file.map_header(|header| {
        assert_eq!(header.raw().num_sectors as usize, NUM_DIRECT + 1);
        assert_ne!(header.raw().indir_sector, NONE_SECTOR);
        assert_ne!(header.first_indir()[0], NONE_SECTOR);
        assert_eq!(header.first_indir()[1], NONE_SECTOR);
    });
    assert!(check(&disk));
}

#[test]
fn expand_failure_leaves_free_map_untouched() {
    let disk = formatted(32);
    let sector = create_file(&disk, "f", 100);

    let mut map = load_free_map(&disk);
    let clear = map.count_clear();

    let file = File::new(disk.clone(), sector);
    assert_eq!(file.expand(&mut map, 32 * SECTOR_SIZE as u32), Err(NoSpace));
    assert_eq!(map.count_clear(), clear);
}

#[test]
fn directory_grows_by_a_fixed_step() {
    let disk = formatted(128);
    for i in 0..NUM_DIR_ENTRIES {
        create_file(&disk, &format!("f{i}"), 0);
    }

    let root = File::new(disk.clone(), ROOT_DIR_SECTOR);
    assert_eq!(root.length(), DIRECTORY_FILE_SIZE);

    // 第 11 个名字挤不进初始的表，存储文件就地长出一截
    create_file(&disk, "extra", 0);
    let root = File::new(disk.clone(), ROOT_DIR_SECTOR);
    assert_eq!(
        root.length() as usize,
        DIRECTORY_FILE_SIZE as usize + NEW_DIR_ENTRIES * DirEntry::SIZE
    );

    let mut dir = Directory::new(0);
    dir.fetch_from(&root);
    for i in 0..NUM_DIR_ENTRIES {
        assert!(dir.find(&format!("f{i}")).is_some());
    }
    assert!(dir.find("extra").is_some());
    assert!(check(&disk));
}

#[test]
fn directory_remove_reuses_the_slot() {
    let disk = formatted(128);
    create_file(&disk, "a", 0);
    let sector_b = create_file(&disk, "b", 0);

    let root = File::new(disk.clone(), ROOT_DIR_SECTOR);
    let mut dir = Directory::new(0);
    dir.fetch_from(&root);

    assert!(dir.remove("a"));
    assert!(!dir.remove("a"));
    assert_eq!(dir.find("a"), None);
    assert_eq!(dir.find("b"), Some(sector_b));
    assert!(!dir.is_empty());

    let mut map = load_free_map(&disk);
    dir.add("c", sector_b, false, &mut map, &root).unwrap();
    dir.write_back(&root);

    let mut reread = Directory::new(0);
    reread.fetch_from(&root);
    assert_eq!(reread.find("c"), Some(sector_b));
}

#[test]
fn file_write_read_roundtrip() {
    let disk = formatted(128);
    let sector = create_file(&disk, "f", 300);
    let file = File::new(disk.clone(), sector);

    let data = pattern(300, 7);
    assert_eq!(file.write_at(&data, 0), 300);

    let mut readback = vec![0; 300];
    assert_eq!(file.read_at(&mut readback, 0), 300);
    assert_eq!(readback, data);

    // 跨扇区的半截写
    let patch = pattern(40, 99);
    assert_eq!(file.write_at(&patch, 120), 40);
    let mut readback = vec![0; 40];
    assert_eq!(file.read_at(&mut readback, 120), 40);
    assert_eq!(readback, patch);

    // 补丁前后的字节原封不动
    let mut head = vec![0; 120];
    assert_eq!(file.read_at(&mut head, 0), 120);
    assert_eq!(head, data[..120]);
}

#[test]
fn file_io_stops_at_the_end() {
    let disk = formatted(128);
    let sector = create_file(&disk, "f", 100);
    let file = File::new(disk.clone(), sector);

    assert_eq!(file.write_at(&[1; 200], 50), 50);
    assert_eq!(file.write_at(&[1; 10], 100), 0);

    let mut buf = [0; 200];
    assert_eq!(file.read_at(&mut buf, 50), 50);
    assert_eq!(file.read_at(&mut buf, 100), 0);
}

#[test]
fn big_file_content_survives_the_boundary() {
    let disk = formatted(1024);
    let size = MAX_DIRECT_SIZE + 3 * SECTOR_SIZE;
    let sector = create_file(&disk, "big", size as u32);
    let file = File::new(disk.clone(), sector);

    let data = pattern(size, 3);
    assert_eq!(file.write_at(&data, 0), size);

    let mut readback = vec![0; size];
    assert_eq!(file.read_at(&mut readback, 0), size);
    assert_eq!(readback, data);
    assert!(check(&disk));
}

#[test]
fn block_file_images_survive_a_reopen() {
    let path = std::env::temp_dir().join(format!("sector-fs-test-{}.img", std::process::id()));
    let data = pattern(200, 42);
    {
        let fd = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();
        let disk: Arc<dyn SectorDisk> = Arc::new(crate::BlockFile::create(fd, 128));
        format(&disk);
        let sector = create_file(&disk, "persist", 200);
        File::new(disk.clone(), sector).write_at(&data, 0);
    }
    {
        let fd = std::fs::File::open(&path).unwrap();
        let disk: Arc<dyn SectorDisk> = Arc::new(crate::BlockFile::open(fd));
        assert_eq!(disk.num_sectors(), 128);
        assert!(check(&disk));

        let root = File::new(disk.clone(), ROOT_DIR_SECTOR);
        let mut dir = Directory::new(0);
        dir.fetch_from(&root);
        let sector = dir.find("persist").unwrap();

        let mut readback = vec![0; 200];
        assert_eq!(File::new(disk.clone(), sector).read_at(&mut readback, 0), 200);
        assert_eq!(readback, data);
    }
    let _ = std::fs::remove_file(&path);
}

#[test]
fn swap_files_are_scanned_and_struck_out() {
    let disk = formatted(128);
    create_file(&disk, "keep", 0);
    create_file(&disk, "SWAP.3", 0);

    let root = File::new(disk.clone(), ROOT_DIR_SECTOR);
    let mut dir = Directory::new(0);
    dir.fetch_from(&root);

    assert_eq!(dir.find_swap_file().as_deref(), Some("SWAP.3"));
    // 内存映像里已注销，再扫就没有了
    assert_eq!(dir.find_swap_file(), None);
    assert!(dir.find("keep").is_some());
}
