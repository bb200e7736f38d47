use mapalloc::MapAlloc;

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() {
    let allocator = MapAlloc::new();

    unsafe {
        let greeting = b"a heap without a heap";

        let addr = allocator.malloc(greeting.len());
        log_alloc(addr, greeting.len());

        addr.copy_from_nonoverlapping(greeting.as_ptr(), greeting.len());

        let grown = allocator.realloc(addr, 4096);
        println!("Resized to 4096 bytes, now at: {grown:?}");

        let zeroed = allocator.calloc(16, 8);
        log_alloc(zeroed, 16 * 8);

        allocator.free(grown);
        allocator.free(zeroed);
    }

    println!("{:?}", allocator.stats());
}
