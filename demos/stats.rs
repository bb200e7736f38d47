use mapalloc::MapAlloc;

fn main() {
    let allocator = MapAlloc::new();

    unsafe {
        // One small request per class: the two little ones share a 16 KiB
        // block, the others each map their own.
        let pointers = [
            allocator.malloc(100),
            allocator.malloc(3000),
            allocator.malloc(20_000),
            allocator.malloc(1_500_000),
        ];

        let stats = allocator.stats();
        println!("mallocs:   {}", stats.mallocs);
        println!("frees:     {}", stats.frees);
        println!("requested: {} bytes", stats.requested);
        println!("blocks:    {}", stats.blocks);

        for ptr in pointers {
            allocator.free(ptr);
        }
    }

    println!("after teardown: {:?}", allocator.stats());
}
